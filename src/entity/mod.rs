pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod order_histories;
pub mod orders;
pub mod products;
pub mod shipping_addresses;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use order_histories::Entity as OrderHistories;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use shipping_addresses::Entity as ShippingAddresses;
pub use users::Entity as Users;
