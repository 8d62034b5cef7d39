pub mod seed_loader;

pub use seed_loader::{load_seed, parse_seed, Seed};
