pub mod calculation_audit;
