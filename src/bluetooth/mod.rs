pub mod scanner;

pub use scanner::{AdvertisementSource, BluetoothScanner};
