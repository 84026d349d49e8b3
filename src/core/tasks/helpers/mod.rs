mod subscription;
pub use subscription::{Delivery, Subscription};
