pub mod event_ticket;
pub mod order;
pub mod order_item;
pub mod product;
pub mod visitor;

pub use event_ticket::Entity as EventTicket;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use visitor::Entity as Visitor;
