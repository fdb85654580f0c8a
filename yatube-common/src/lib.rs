pub mod form;
pub mod model;
pub mod pagination;
pub mod util;
