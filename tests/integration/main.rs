//! Integration tests against mock key publishers and token endpoints.

mod validation_flow;
