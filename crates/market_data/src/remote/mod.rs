pub mod angel_one;
pub mod kite_response;
pub mod smartapi_response;
pub mod zerodha;

pub use angel_one::AngelOneClient;
pub use zerodha::ZerodhaClient;
