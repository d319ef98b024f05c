// Library exports following Clean Architecture principles

// Domain layer (core business logic)
pub mod domain;

// Entities, factories and data sources
pub mod data;

// Response representations
pub mod responses;

// Responders and handler resolution
pub mod responders;

// Use cases layer (application business rules)
pub mod use_cases;

// Adapters layer (interface adapters)
pub mod adapters;

// Infrastructure layer (frameworks & drivers)
pub mod infrastructure;

// Manifest configuration
pub mod config;

// Wiring of the above into a servable application
pub mod application;

pub use application::Application;
