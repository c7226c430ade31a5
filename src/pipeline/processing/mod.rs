// Pipeline processing: region mapping, case cleaning and climate harmonization

pub mod cases;
pub mod climate;
pub mod dates;
pub mod region;
