pub mod obj;
pub mod pack;
pub mod part;
pub mod prc;
pub mod unpack;

pub use obj::{ObjectRecord, parse_objects};
pub use pack::{BitStreamWriter, PackError, pack};
pub use part::{PartBundle, PartEntry, build_bundle};
pub use prc::{RelEntry, build_prc, parse_prc, parse_rel};
pub use unpack::{UnpackError, max_unpacked_len, unpack, unpack_into, unpacked_len};
