/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! ARMv7-M back-end encoding engine for a dynamic assembler: a JIT host
//! hands this crate a stream of pre-compiled *action words* plus runtime
//! operands, and the three-pass state machine below turns that into a
//! contiguous block of Thumb-2 machine code with every intra- and
//! inter-section branch, label reference, PC-relative load and immediate
//! slot patched.
//!
//! The three passes run in strict order against one [`state::State`]:
//! [`pass1::put`] (record one template's actions and operands, once per
//! template), then once every template is recorded, [`pass2::link`]
//! (finalise offsets, size the output) and [`pass3::encode`] (emit into the
//! caller's buffer).

pub mod action;
pub mod bits;
pub mod config;
pub mod diag;
pub mod errors;
pub mod pass1;
pub mod pass2;
pub mod pass3;
pub mod state;

pub use action::Action;
pub use config::Limits;
pub use errors::{EncodeError, PcLabelError};
pub use state::State;
