//! JerseyNexus - REST backend for a football jersey store
//!
//! This library provides the catalogue, cart, checkout, payment and
//! notification logic behind the JerseyNexus storefront and admin panel.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
