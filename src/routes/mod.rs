pub mod payment;
mod route;
pub mod util;

pub use payment::payment_route;
pub use route::main_route;
pub use util::util_route;
