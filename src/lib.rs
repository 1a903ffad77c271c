pub mod cache;
pub mod config;
pub mod exception;
pub mod handler;
pub mod index;
pub mod negotiate;
pub mod param;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod simplate;
pub mod static_handler;
pub mod util;
pub mod walker;
pub mod website;
pub mod wrapper;

pub use cache::FileCache;
pub use config::{Config, Configurer};
pub use exception::Exception;
pub use handler::{AssignmentLogic, Context, LogicRunner, SimplateHandler};
pub use index::{SiteBuilder, SiteIndex};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use pipeline::{HandlerFunc, HandlerFuncRegistration, Pipeline, Stage};
pub use registry::Registry;
pub use request::Request;
pub use response::Response;
pub use simplate::{Page, PageSpec, Simplate, SimplateType};
pub use walker::TreeWalker;
pub use website::{Settings, Website};
pub use wrapper::HttpResponseWrapper;
