use serde::{Deserialize, Deserializer, Serialize};

/// One transaction row as returned by the upstream data source.
///
/// Written verbatim into partition files; field semantics are not interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub chain_id: String,
    pub category: String,
    pub transaction_type: String,
    pub transaction_hash: String,
    pub block_number: i64,
    pub date_time: String,
    pub from_address: String,
    pub to_address: String,
    #[serde(default)]
    pub asset_contract_address: Option<String>,
    pub asset_symbol_name: String,

    /// Decimal text. The upstream source may send either a JSON string or a number.
    #[serde(deserialize_with = "decimal_text")]
    pub value_amount: String,

    #[serde(deserialize_with = "decimal_text")]
    pub gas_fee_eth: String,

    #[serde(default)]
    pub token_id: Option<String>,
}

/// Column order of the partition file schema.
pub const COLUMNS: &[&str] = &[
    "id",
    "chain_id",
    "category",
    "transaction_type",
    "transaction_hash",
    "block_number",
    "date_time",
    "from_address",
    "to_address",
    "asset_contract_address",
    "asset_symbol_name",
    "value_amount",
    "gas_fee_eth",
    "token_id",
];

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn decimal_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_decimal_fields_from_strings_and_numbers() {
        let raw = serde_json::json!([
            {
                "id": "0x01-0",
                "chain_id": "1",
                "category": "external",
                "transaction_type": "external",
                "transaction_hash": "0x01",
                "block_number": 12,
                "date_time": "2023-01-01T00:03:00.000Z",
                "from_address": "0xabc",
                "to_address": "0xdef",
                "asset_contract_address": null,
                "asset_symbol_name": "ETH",
                "value_amount": "1.50000000",
                "gas_fee_eth": 0.0021,
                "token_id": null
            },
            {
                "id": "0x02-1",
                "chain_id": "1",
                "category": "token",
                "transaction_type": "erc721",
                "transaction_hash": "0x02",
                "block_number": 13,
                "date_time": "2023-01-01T00:03:15.000Z",
                "from_address": "0xabc",
                "to_address": "0xdef",
                "asset_contract_address": "0xcontract",
                "asset_symbol_name": "USDC",
                "value_amount": 42,
                "gas_fee_eth": "0.00100000",
                "token_id": "77"
            }
        ]);

        let records: Vec<TransactionRecord> = serde_json::from_value(raw).unwrap();
        assert_eq!(records[0].value_amount, "1.50000000");
        assert_eq!(records[0].gas_fee_eth, "0.0021");
        assert_eq!(records[0].asset_contract_address, None);
        assert_eq!(records[1].value_amount, "42");
        assert_eq!(records[1].token_id.as_deref(), Some("77"));
    }
}
