use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::index::BitmapIndex;

impl Serialize for BitmapIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BitmapIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = String::deserialize(deserializer)?;
        Ok(Self::from_rle(&data))
    }
}
