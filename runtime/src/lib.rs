// Copyright 2026 flipbook-dl contributors
// SPDX-License-Identifier: Apache-2.0

//! flipbook-dl library: download paginated flipbook publications into a PDF.
//!
//! The pipeline runs four phases, each consuming the previous one's plain
//! records: [`manifest`] resolves the publication, [`download`] fetches its
//! page images, [`capture`] optionally re-renders interactive pages in a
//! headless browser, and [`assemble`] merges both streams into one document.
//! [`pipeline::Pipeline`] wires them together.

pub mod acquisition;
pub mod assemble;
pub mod capture;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod renderer;

pub use error::{Error, Result};
