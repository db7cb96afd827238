pub mod combine;
pub mod heat_demand;
pub mod mask;
