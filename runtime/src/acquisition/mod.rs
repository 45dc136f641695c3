//! HTTP acquisition: the fetch capability used by the manifest resolver and
//! the image downloader.

pub mod http_client;
