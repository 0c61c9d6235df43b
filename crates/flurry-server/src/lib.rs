//! Flurry Broker HTTP Surface
//!
//! This crate wraps the rendezvous core in its HTTP skin. The handlers are
//! deliberately thin: each reads the opaque request payload, calls one core
//! operation, and maps the outcome to a contractual status code.
//!
//! | Route        | Method | Status out        |
//! |--------------|--------|-------------------|
//! | `/client`    | POST   | 200 / 503 / 504   |
//! | `/proxy`     | POST   | 200 / 400 / 504   |
//! | `/answer`    | POST   | 200 / 400 / 410   |
//! | `/debug`     | GET    | 200               |
//! | `/robots.txt`| GET    | 200               |

pub mod error;
pub mod handlers;
pub mod http_server;

pub use error::ServerError;
pub use http_server::BrokerServer;
