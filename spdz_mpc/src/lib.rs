//! Evaluation of secure multiparty computations with the SPDZ protocol.
//!
//! Computations are described with a [`builder::ProtocolBuilder`] as a tree
//! of sequential and parallel steps. The [`executor::BatchEvaluator`] pulls
//! native protocols from that tree in batches and evaluates each batch in
//! communication rounds. Values opened during evaluation are verified with MAC
//! checks scheduled between batches before any of them is returned to the
//! application.

pub mod bitvec;
pub mod builder;
pub mod config;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod fields;
pub mod network;
pub mod producer;
pub mod spdz;
pub mod transport;

pub use error::Error;

/// ID of a party. Parties are numbered from 1.
pub type PartyId = usize;
