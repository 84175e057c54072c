//! Stimulus generation.
//!
//! Pure functions that draw each trial's stimuli, force n-back matches and
//! lures, and precompute whole-session sequences for the fixed-count and
//! variable-n protocols. Nothing here keeps state between calls; all history
//! is passed in and all randomness comes from the caller's `Rng`.

pub mod arithmetic;
pub mod sequence;
pub mod stimulus;

pub use arithmetic::{
    choose_arithmetic_operation, default_acceptable_decimals, divides_cleanly,
    generate_arithmetic_operand, AcceptableDecimal, EnabledOperations, Operation,
};
pub use sequence::{
    compute_fixed_count_sequence, compute_fixed_count_sequence_bounded,
    compute_variable_n_sequence, count_matches, FixedCountSequence,
};
pub use stimulus::{
    apply_nback_matching, apply_static_defaults, generate_base_stimuli, MatchChances, Stimuli,
};
