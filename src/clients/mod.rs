pub mod api;
pub mod http;
pub mod lahza;
pub mod memory;
pub mod traits;

pub use api::ApiClient;
pub use http::{ApiNotificationSink, ApiPropertyDirectory};
pub use lahza::LahzaGateway;
pub use memory::{InMemoryNotificationSink, InMemoryPropertyDirectory, ScriptedGateway};
pub use traits::{Checkout, NotificationSink, PaymentGateway, PropertyDirectory};
