pub mod bloqueos;
