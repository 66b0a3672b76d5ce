//! Protobuf messages stored in event-log records.
//!
//! Only the fields needed for scalar extraction are declared; prost skips
//! everything else (graphs, histograms, images, session logs) while decoding.

/// Plugin name attached to scalar tensor summaries.
pub const SCALARS_PLUGIN: &str = "scalars";

/// `DataClass::DATA_CLASS_SCALAR` in `SummaryMetadata`.
pub const DATA_CLASS_SCALAR: i32 = 1;

/// `DataType` values understood when reading raw `tensor_content`.
pub const DT_FLOAT: i32 = 1;
pub const DT_DOUBLE: i32 = 2;
pub const DT_INT32: i32 = 3;
pub const DT_INT64: i32 = 9;

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(double, tag = "1")]
    pub wall_time: f64,
    #[prost(int64, tag = "2")]
    pub step: i64,
    #[prost(oneof = "event::What", tags = "3, 5")]
    pub what: Option<event::What>,
}

pub mod event {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum What {
        #[prost(string, tag = "3")]
        FileVersion(String),
        #[prost(message, tag = "5")]
        Summary(super::Summary),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Summary {
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<summary::Value>,
}

pub mod summary {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Value {
        #[prost(string, tag = "1")]
        pub tag: String,
        #[prost(message, optional, tag = "9")]
        pub metadata: Option<super::SummaryMetadata>,
        #[prost(oneof = "value::Value", tags = "2, 8")]
        pub value: Option<value::Value>,
    }

    pub mod value {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum Value {
            #[prost(float, tag = "2")]
            SimpleValue(f32),
            #[prost(message, tag = "8")]
            Tensor(super::super::TensorProto),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SummaryMetadata {
    #[prost(message, optional, tag = "1")]
    pub plugin_data: Option<PluginData>,
    #[prost(string, tag = "2")]
    pub display_name: String,
    #[prost(int32, tag = "4")]
    pub data_class: i32,
}

impl SummaryMetadata {
    pub fn is_scalar(&self) -> bool {
        self.data_class == DATA_CLASS_SCALAR
            || self
                .plugin_data
                .as_ref()
                .is_some_and(|p| p.plugin_name == SCALARS_PLUGIN)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PluginData {
    #[prost(string, tag = "1")]
    pub plugin_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub content: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorProto {
    #[prost(int32, tag = "1")]
    pub dtype: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub tensor_content: Vec<u8>,
    #[prost(float, repeated, tag = "5")]
    pub float_val: Vec<f32>,
    #[prost(double, repeated, tag = "6")]
    pub double_val: Vec<f64>,
    #[prost(int32, repeated, tag = "7")]
    pub int_val: Vec<i32>,
    #[prost(int64, repeated, tag = "10")]
    pub int64_val: Vec<i64>,
}

impl TensorProto {
    /// First element of the tensor as `f64`, if it holds a number.
    pub fn scalar_value(&self) -> Option<f64> {
        if let Some(v) = self.float_val.first() {
            return Some(f64::from(*v));
        }
        if let Some(v) = self.double_val.first() {
            return Some(*v);
        }
        if let Some(v) = self.int_val.first() {
            return Some(f64::from(*v));
        }
        if let Some(v) = self.int64_val.first() {
            return Some(*v as f64);
        }
        let bytes = self.tensor_content.as_slice();
        match self.dtype {
            DT_FLOAT => bytes
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .map(|b| f64::from(f32::from_le_bytes(b))),
            DT_DOUBLE => bytes
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .map(f64::from_le_bytes),
            DT_INT32 => bytes
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .map(|b| f64::from(i32::from_le_bytes(b))),
            DT_INT64 => bytes
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .map(|b| i64::from_le_bytes(b) as f64),
            _ => None,
        }
    }
}
