//! Proposal generator adapters.

pub mod llm_generator;

pub use llm_generator::LlmProposalGenerator;
