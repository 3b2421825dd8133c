//! Runnable scenarios that drive a real workspace end to end with a
//! scripted generator.

pub mod relay;
