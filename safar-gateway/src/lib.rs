pub mod ccavenue;
pub mod odis;

pub use ccavenue::CcAvenueGateway;
pub use odis::OdisClient;
