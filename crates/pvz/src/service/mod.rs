mod order;
mod packager;

pub use self::order::OrderService;
pub use self::packager::Packager;
