//! HTTP request handlers

pub mod bridge;
