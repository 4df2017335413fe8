//! FlowRunner: a headless engine for authoring and executing declarative
//! HTTP API flows — a tree of request/condition/loop steps sharing a
//! runtime variable context.
//!
//! The dependency order mirrors the module layout: [`path`] underlies
//! [`substitution`] and [`condition`]; those underlie [`model`], [`codec`],
//! and [`mutator`]; all of the above feed [`interpreter`], the suspendable
//! execution engine; [`host`] is the narrow boundary the interpreter and
//! codec need from whatever embeds this crate.

pub mod codec;
pub mod condition;
pub mod config;
pub mod context;
pub mod errors;
pub mod extraction;
pub mod host;
pub mod interpreter;
pub mod model;
pub mod mutator;
pub mod path;
pub mod substitution;
pub mod telemetry;
pub mod ui_state;
pub mod update_check;
pub mod validation;
