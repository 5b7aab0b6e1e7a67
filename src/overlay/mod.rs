pub mod element;
pub mod observer;
pub mod profile;
pub mod scanner;

pub use element::{ElementNode, ElementTree, JsonFileElementTree, StaticElementTree};
pub use observer::{MutationSignal, OverlayObserver};
pub use profile::ScannerProfile;
pub use scanner::OverlayAnomalyScanner;
