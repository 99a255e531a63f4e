pub mod scans;
pub mod tenants;
