pub mod booking;
pub mod notification;
pub mod payment;
pub mod session;

pub use booking::{Booking, BookingStatus, DateRange, PropertyInfo};
pub use notification::{Notification, NotificationKind};
pub use payment::{PaymentAttempt, PaymentStatus};
pub use session::{Role, Session};
