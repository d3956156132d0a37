mod addr;

pub use addr::*;
