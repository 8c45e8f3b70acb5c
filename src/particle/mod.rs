mod bootstrap;

pub use bootstrap::{alpha_gauss, BootstrapFilter, ErrorLnPdf};
