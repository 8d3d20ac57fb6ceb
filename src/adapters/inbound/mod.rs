pub mod http_server;

pub use http_server::{AppState, RegisterRequest, UrlRequest};
