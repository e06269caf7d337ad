pub mod models;
pub mod services;

pub use models::ProfessionalFilters;
pub use services::ProfessionalService;
