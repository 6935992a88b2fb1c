// SPDX-License-Identifier: MIT

//! Clinical case generation on top of a small graph workflow engine

pub mod collaborators;
pub mod config;
pub mod decode;
pub mod phases;
pub mod pipeline;
pub mod translation;
pub mod types;
pub mod workflow;

pub use collaborators::{
    CaseCollaborators, Critic, FieldRefiner, Generator, ModelCollaborators, RefinerRegistry,
    Translator, Voter,
};
pub use config::{PipelineOptions, Settings};
pub use pipeline::CaseGenerator;
pub use translation::{TranslationCache, TranslationPipeline};
pub use types::{Case, DraftEntry, Finding, GenerationRequest, Severity, Vote};
