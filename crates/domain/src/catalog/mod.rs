//! Ticket classification: categories and departments.

mod category;
mod department;
mod events;

pub use category::Category;
pub use department::Department;
pub use events::{CategoryData, CategoryEvent, DepartmentData, DepartmentEvent};

/// Maximum length of a category or department name.
pub const NAME_MAX_LEN: usize = 100;

/// Minimum length of a category or department name.
pub const NAME_MIN_LEN: usize = 2;

/// Maximum length of a category or department description.
pub const DESCRIPTION_MAX_LEN: usize = 500;
