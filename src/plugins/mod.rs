pub mod spouse;
