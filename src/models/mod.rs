mod user;
mod client;
mod project;
mod order;
mod order_item;
mod payment;
mod product;
mod service;
mod file_upload;

pub use user::{User, UserType, UserView};
pub use client::Client;
pub use project::Project;
pub use order::{Balance, CASH_ON_DELIVERY, Order, OrderStats, Settlement, tally_statuses};
pub use order_item::OrderItem;
pub use payment::Payment;
pub use product::{Product, ProductOwner, ProductWithOwner};
pub use service::Service;
pub use file_upload::FileUpload;
