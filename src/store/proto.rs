use std::collections::HashMap;

/// Schema version written into every protocol table.
pub(crate) const SCHEMA_VERSION: u32 = 1;

/// Tables carry their schema version in field 1.
pub(crate) trait TableProto: prost::Message + Default {
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct LocalIdentityProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub identity_key_pair: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "3")]
    pub registration_id: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub username: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub signaling_key: Option<String>,
    #[prost(uint32, optional, tag = "6")]
    pub reset_version: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct PreKeyTableProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(map = "uint32, bytes", tag = "2")]
    pub keys: HashMap<u32, Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SignedPreKeyTableProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(map = "uint32, bytes", tag = "2")]
    pub keys: HashMap<u32, Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SessionProto {
    #[prost(bytes = "vec", tag = "1")]
    pub state: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub fresh: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SessionTableProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(map = "string, message", tag = "2")]
    pub sessions: HashMap<String, SessionProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct IdentityTableProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(map = "string, bytes", tag = "2")]
    pub identities: HashMap<String, Vec<u8>>,
}

macro_rules! impl_table_proto {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl TableProto for $ty {
                fn version(&self) -> u32 {
                    self.version
                }

                fn set_version(&mut self, version: u32) {
                    self.version = version;
                }
            }
        )+
    };
}

impl_table_proto!(
    LocalIdentityProto,
    PreKeyTableProto,
    SignedPreKeyTableProto,
    SessionTableProto,
    IdentityTableProto,
);
