pub mod decoder;
pub mod validator;
pub mod window;

pub use decoder::decode;
pub use validator::BeaconValidator;
pub use window::AdvertisementWindow;
