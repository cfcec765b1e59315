pub mod compare_pair;
pub mod configuration;
pub mod layout;
pub mod model;
pub mod optimizer;
pub mod pairs;
pub mod tile;

pub use compare_pair::*;
pub use configuration::*;
pub use layout::*;
pub use model::*;
pub use optimizer::*;
pub use pairs::*;
pub use tile::*;
