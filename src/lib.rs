//! IncidentGate -- evidence-gated incident root-cause analysis.
//!
//! This crate provides the diagnosis pipeline: evidence collection, timeline
//! correlation, hypothesis verification, and a decision gate that prefers
//! refusing over guessing.

pub mod collect;
pub mod config;
pub mod decision;
pub mod evidence;
pub mod hypothesis;
pub mod pipeline;
pub mod plan;
pub mod timeline;
pub mod verify;

pub use config::PipelineConfig;
pub use decision::{Decision, DecisionKind};
pub use evidence::{Evidence, EvidenceSet, Source};
pub use pipeline::{AnalysisOutcome, AnalysisRequest, Orchestrator};
