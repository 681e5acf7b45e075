//! SeaORM entities for the endpoint and probe result tables.

pub mod endpoint;
pub mod probe_result;

pub mod prelude {
    pub use super::endpoint::ActiveModel as EndpointActiveModel;
    pub use super::endpoint::Column as EndpointColumn;
    pub use super::endpoint::Entity as Endpoint;
    pub use super::endpoint::Model as EndpointModel;

    pub use super::probe_result::ActiveModel as ProbeResultActiveModel;
    pub use super::probe_result::Column as ProbeResultColumn;
    pub use super::probe_result::Entity as ProbeResult;
    pub use super::probe_result::Model as ProbeResultModel;
}
