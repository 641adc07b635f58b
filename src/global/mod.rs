//! Derivative-free searches for the global minimum of a function over a box.

use rand::rngs::StdRng;
use rand::SeedableRng;

mod differential_evolution;
pub use self::differential_evolution::{
    Crossover, DifferentialEvolution, DifferentialEvolutionBuilder, Init, Mutation, Strategy,
};

mod basin_hopping;
pub use self::basin_hopping::{BasinHopping, BasinHoppingBuilder, LocalSearch};

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
