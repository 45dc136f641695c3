//! In-page scripts run against the flipbook viewer before a screenshot.

/// Makes opacity-hidden text layers visible and fires rectangle action
/// triggers so their revealed content is on screen.
pub const REVEAL_SCRIPT: &str = r#"(() => {
  let revealed = 0;
  let clicked = 0;
  document.querySelectorAll('[id^="E+_Text_"], .leo-comp--txt').forEach(el => {
    const cs = window.getComputedStyle(el);
    if (cs.opacity !== '0') return;
    el.style.opacity = '1';
    if (cs.visibility === 'hidden') el.style.visibility = 'visible';
    if (cs.display === 'none') el.style.display = '';
    revealed++;
  });
  document.querySelectorAll('[id^="E+_Rectangle_"], .leo-comp--shape-rect.leo-action-trigger').forEach(el => {
    try {
      if (window.getComputedStyle(el).opacity === '0') el.style.opacity = '0.01';
      if (typeof el.click === 'function') { el.click(); clicked++; }
    } catch (_) {}
  });
  return { revealed, clicked };
})()"#;

/// Viewer chrome hidden before capture.
const UI_SELECTORS: &[&str] = &[
    "#fbTopBar",
    "#fbToolBar",
    ".fbTopBar",
    ".fbToolBar",
    ".logoBar",
    ".topRightBar",
    ".searchBar",
    ".buttonBar",
    ".pageBar",
    ".toolbar",
    ".navbar",
    ".nav",
    "header",
    ".header",
    ".footer",
    ".app-header",
    ".app-footer",
    ".flipbook-bar",
    ".flipbook-menu",
    ".flipbook-nav",
    ".flipbook-ui",
    ".flip-book-toolbar",
    ".menu",
    ".top-menu",
    ".bottom-menu",
    ".button",
    ".btn",
    ".btn-toolbar",
    ".control",
    ".controls",
    ".navigation",
    ".ui-element",
    ".zoom-panel",
    ".thumbnails",
    ".hint",
    ".loading",
    ".bookLoading",
    ".fixed-top",
    ".fixed-bottom",
    ".ms-control",
    ".ms-toolbar",
    "#toolbar",
    "#menu",
    "#header",
    "#footer",
    "#appFooter",
    "#loadingFooter",
    "[class*=\"menu\"]",
    "[class*=\"toolbar\"]",
    "[class*=\"button\"]",
    "[class*=\"control\"]",
    "[class*=\"nav\"]",
];

const HIDE_RULE: &str = "display: none !important; visibility: hidden !important; \
opacity: 0 !important; pointer-events: none !important; height: 0 !important; \
width: 0 !important; overflow: hidden !important; position: absolute !important; \
z-index: -1000 !important;";

/// Script that hides viewer chrome and stretches the page showing `page`
/// over the whole viewport. Evaluates to one of the [`IsolationOutcome`] tags.
pub fn isolate_page_script(page: u32) -> String {
    let is_first = page == 1;
    let is_right = page % 2 == 0;
    let css: String = UI_SELECTORS
        .iter()
        .map(|selector| format!("{selector} {{ {HIDE_RULE} }}\n"))
        .collect();
    let css = serde_json::to_string(&css).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"(() => {{
  const style = document.createElement('style');
  style.textContent = {css};
  document.head.appendChild(style);

  const pages = Array.from(document.querySelectorAll('.leo-page, .flipbook-page, .page-elem, .flipbook-page3d, [class*="page"]'))
    .filter(el => {{
      const cs = window.getComputedStyle(el);
      const rect = el.getBoundingClientRect();
      return cs.display !== 'none'
        && cs.visibility !== 'hidden'
        && cs.opacity !== '0'
        && parseInt(cs.zIndex || 0) > 0
        && rect.width > 100
        && rect.height > 100;
    }});

  const isFirst = {is_first};
  const isRight = {is_right};
  const fill = el => {{
    el.style.cssText = 'position:fixed;top:0;left:0;width:100vw;height:100vh;z-index:9999;';
    document.body.style.background = 'white';
    document.documentElement.style.background = 'white';
  }};

  if (isFirst && pages.length > 0) {{
    fill(pages[0]);
    return 'first-page';
  }}
  if (pages.length >= 2) {{
    pages.sort((a, b) => a.getBoundingClientRect().left - b.getBoundingClientRect().left);
    fill(isRight ? pages[1] : pages[0]);
    return 'spread';
  }}
  if (pages.length === 1) {{
    fill(pages[0]);
    return 'single-page';
  }}
  return 'no-page';
}})()"#
    )
}

/// What the isolation script found on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationOutcome {
    FirstPage,
    Spread,
    SinglePage,
    /// No visible page element; the screenshot shows the viewer as is.
    NoPage,
}

impl IsolationOutcome {
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value.as_str() {
            Some("first-page") => Self::FirstPage,
            Some("spread") => Self::Spread,
            Some("single-page") => Self::SinglePage,
            _ => Self::NoPage,
        }
    }
}
