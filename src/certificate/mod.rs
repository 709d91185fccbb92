pub mod chain;

pub use chain::CertificateChain;
