mod load;
mod types;

pub use load::{
    apply_env_overrides, get_flowpilot_data_dir, load, load_default, load_from_path, snapshot_dir,
};
pub use types::*;
