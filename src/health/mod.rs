pub mod prober;
pub mod recovery;
