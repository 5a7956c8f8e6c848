//! # shopkeep-client: REST Client for Shopkeep
//!
//! Everything the back office sends to, and receives from, the API.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Client Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  api::{AuthApi, ProductsApi, SuppliersApi, InventoryApi,         │  │
//! │  │        SalesApi}   typed calls, input validated first            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ raw JSON ──► normalize ──► core types   │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  ApiClient (http.rs)                                             │  │
//! │  │   bearer token · one refresh on 401 · 403 → AccessDenied         │  │
//! │  │   retry 5xx/network with backoff · GET cache + in-flight sharing │  │
//! │  └───────────────┬───────────────────────────────┬──────────────────┘  │
//! │                  ▼                               ▼                      │
//! │  ┌────────────────────────────┐   ┌────────────────────────────────┐   │
//! │  │ AuthManager (auth.rs)      │   │ dyn HttpTransport              │   │
//! │  │  session in memory + SQLite│   │  ReqwestTransport / MockTrans. │   │
//! │  │  single-flight refresh     │   └────────────────────────────────┘   │
//! │  │  AuthEvent broadcast       │                                         │
//! │  └────────────────────────────┘                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`api`] - Endpoint groups
//! - [`auth`] - Session, token refresh, auth events
//! - [`config`] - Client configuration (TOML + env)
//! - [`error`] - Client error types
//! - [`http`] - `ApiClient` request pipeline
//! - [`mock`] - Scripted transport for tests
//! - [`normalize`] - Response shape normalization
//! - [`transport`] - Transport trait and reqwest implementation

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod normalize;
pub mod transport;

pub use api::{Bill, BillLine, ProductQuery, SupplierQuery};
pub use auth::{AuthEvent, AuthManager, TokenGrant};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::{query, ApiClient, Query};
pub use mock::{MockReply, MockTransport};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
