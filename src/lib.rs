// ============================================================
// math_answer_classifier
// ============================================================
// Learns a closed-set mapping from math problem statements to
// solutions seen in a reviewed corpus, and serves it.
//
//   Layer 1  cli/          clap front end
//   Layer 2  application/  training job, coordinator, inference,
//                          submissions, explanation tables
//   Layer 3  domain/       plain types and collaborator traits
//   Layer 4  data/         normalizer, gatekeeper, vocabulary,
//                          label space, split, batching
//   Layer 5  ml/           Burn model, training loop, scorer,
//                          evaluation
//   Layer 6  infra/        SQLite corpus, atomic bundle store,
//                          notification sinks, metrics CSV

#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;

pub use error::{PipelineError, Result};
