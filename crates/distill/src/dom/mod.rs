// ABOUTME: DOM helpers shared by the directive engine, the extractors and the renderers.
// ABOUTME: Text measurement, block-aware text flattening and line-break paragraphing.

//! DOM utilities.
//!
//! Length checks everywhere in the engine are taken on normalized text so that
//! the minimum-content bar and the reported `length` agree.

pub mod brs;
pub mod text;
