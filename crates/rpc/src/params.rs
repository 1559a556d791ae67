//! Parameter schema and precondition flags for method descriptors

#![warn(missing_docs)]

use namechain_core::{Address, Asset};
use serde::{Serialize, Serializer};
use serde_json::Value;

bitflags::bitflags! {
    /// Caller and wallet state a method demands before its handler runs
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Preconditions: u8 {
        /// Caller session must be authenticated
        const AUTHENTICATED = 1 << 0;
        /// Wallet must be open
        const WALLET_OPEN = 1 << 1;
        /// Wallet must be unlocked
        const WALLET_UNLOCKED = 1 << 2;
    }
}

impl Preconditions {
    /// Every flag a wallet-mutating method needs
    pub const WALLET_WRITE: Self = Self::AUTHENTICATED
        .union(Self::WALLET_OPEN)
        .union(Self::WALLET_UNLOCKED);

    /// Lowercase flag names in check order
    pub fn names(&self) -> Vec<&'static str> {
        const NAMES: [(Preconditions, &str); 3] = [
            (Preconditions::AUTHENTICATED, "authenticated"),
            (Preconditions::WALLET_OPEN, "wallet_open"),
            (Preconditions::WALLET_UNLOCKED, "wallet_unlocked"),
        ];

        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for Preconditions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// Declared type of a parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Amount, either a bare integer or `{"amount": n, "asset_id": id}`
    Asset,
    /// 40 hex character address
    Address,
    /// Sequence of `[asset, name_claim]` pairs
    AuctionList,
}

impl ValueType {
    /// Tag shown in help output
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Asset => "asset",
            ValueType::Address => "address",
            ValueType::AuctionList => "vector<pair<asset,name_claim>>",
        }
    }

    /// True if `value` can be read as this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::Bool => value.is_boolean(),
            ValueType::String => value.is_string(),
            ValueType::Asset => parse_asset(value).is_some(),
            ValueType::Address => parse_address(value).is_some(),
            ValueType::AuctionList => value.is_array(),
        }
    }
}

/// Read an asset from a bare integer or an asset object
pub fn parse_asset(value: &Value) -> Option<Asset> {
    match value {
        Value::Number(n) => n.as_u64().map(Asset::new),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

/// Read an address from its hex string form
pub fn parse_address(value: &Value) -> Option<Address> {
    value.as_str().and_then(|s| s.parse().ok())
}

/// One entry in a method's parameter list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    /// Parameter name
    pub name: &'static str,
    /// Declared type
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Whether the argument must be supplied
    pub required: bool,
}

impl ParamDescriptor {
    /// Required parameter
    pub const fn required(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            required: true,
        }
    }

    /// Optional parameter
    pub const fn optional(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            required: false,
        }
    }

    /// `name:type`, bracketed when optional
    pub fn usage(&self) -> String {
        if self.required {
            format!("<{}:{}>", self.name, self.value_type.as_str())
        } else {
            format!("[{}:{}]", self.name, self.value_type.as_str())
        }
    }
}

/// Check `args` against `params`
///
/// Required parameters must be present and well typed. Optional ones may be
/// absent or `null`. Arguments beyond the declared list are rejected.
pub fn validate_arguments(params: &[ParamDescriptor], args: &[Value]) -> Result<(), String> {
    if args.len() > params.len() {
        return Err(format!(
            "expected at most {} arguments, got {}",
            params.len(),
            args.len()
        ));
    }

    for (i, param) in params.iter().enumerate() {
        match args.get(i) {
            None | Some(Value::Null) if param.required => {
                return Err(format!("missing required parameter '{}'", param.name));
            }
            None | Some(Value::Null) => {}
            Some(value) if !param.value_type.accepts(value) => {
                return Err(format!(
                    "parameter '{}' expects {}",
                    param.name,
                    param.value_type.as_str()
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
