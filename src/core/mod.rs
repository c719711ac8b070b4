pub mod body;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod request;
pub mod routes;

pub use body::{BodyEncoding, ParsedBody, reserialize_body};
pub use error::{BodyParseError, BodySerializationError, ConfigurationError, GatewayError};
pub use gateway::GatewayService;
pub use registry::{ServiceEndpoint, ServiceRegistry};
pub use request::{IncomingRequest, OutgoingBody, OutgoingRequest};
pub use routes::{RewriteRule, Route, RouteTable};
