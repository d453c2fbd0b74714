pub mod reduce;
pub mod sites;

pub use reduce::reduce_file;
pub use sites::{list_sites, resolve};
