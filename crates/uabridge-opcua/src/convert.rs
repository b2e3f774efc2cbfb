// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversions between bridge values and OPC UA types.

use opcua::types::{DataTypeId, NodeId, Variant};
use uabridge_core::{Label, NodeValue, ValueType};

/// Returns the OPC UA data type of a node holding `value_type`.
pub fn data_type(value_type: ValueType) -> DataTypeId {
    match value_type {
        ValueType::Double => DataTypeId::Double,
        ValueType::Boolean => DataTypeId::Boolean,
    }
}

/// Converts a node value to a variant.
pub fn to_variant(value: NodeValue) -> Variant {
    match value {
        NodeValue::Double(v) => Variant::Double(v),
        NodeValue::Boolean(v) => Variant::Boolean(v),
    }
}

/// Builds the string node id of `label` in namespace `ns`.
pub fn node_id(ns: u16, label: &Label) -> NodeId {
    NodeId::new(ns, label.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_conversion() {
        assert_eq!(to_variant(NodeValue::Double(36.6)), Variant::Double(36.6));
        assert_eq!(to_variant(NodeValue::Boolean(true)), Variant::Boolean(true));
    }

    #[test]
    fn test_node_id_uses_label() {
        let id = node_id(2, &Label::from("temperature 0"));
        assert_eq!(id, NodeId::new(2, "temperature 0"));
        assert_eq!(id.namespace, 2);
    }

    #[test]
    fn test_data_type() {
        assert_eq!(data_type(ValueType::Double), DataTypeId::Double);
        assert_eq!(data_type(ValueType::Boolean), DataTypeId::Boolean);
    }
}
