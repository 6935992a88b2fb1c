// SPDX-License-Identifier: MIT

//! casegen-rs - multi-phase case generation on a small workflow graph engine
//!
//! - [`adk`] - model providers, retry wrapper and the error hierarchy
//! - [`casegen`] - graph engine, phase graphs, pipeline and translation

pub mod adk;
pub mod casegen;
