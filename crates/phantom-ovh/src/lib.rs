pub mod catalog;
pub mod client;
pub mod dedicated;
pub mod error;
pub mod order;

pub use catalog::{AddonFamily, AvailabilityEntry, Catalog, CatalogPlan, DatacenterAvailability};
pub use client::{OvhClient, RateLimiter, SharedTransport};
pub use dedicated::{
    BootDetail, CompatibleTemplates, IpDetail, IpmiAccess, PartitionDetail, ReverseDetail,
    SchemeDetail, ServerInfo, ServiceInfos, TaskDetail, TemplateDetail,
};
pub use error::OvhError;
pub use order::{CartCreated, CartItem, CheckoutResult, EcoOption};
