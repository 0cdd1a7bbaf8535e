//! Response shapes of the V5 REST API

use crate::error::{RestError, RestResult};
use bybit_types::records::ts_ms;
use bybit_types::{Kline, Side, Trade};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;

/// Common response envelope: `{retCode, retMsg, result, time}`
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// 0 on success
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    /// Error message on failure
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    /// Endpoint-specific payload
    pub result: Option<T>,
    /// Server time (ms since epoch) - the snapshot's as-of marker
    #[serde(default)]
    pub time: i64,
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Unwrap the payload, turning non-zero retCodes into errors
    pub fn into_result(self) -> RestResult<(T, i64)> {
        if self.ret_code != 0 {
            return Err(RestError::Api {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        let result = self
            .result
            .ok_or_else(|| RestError::InvalidResponse("missing result field".to_string()))?;
        Ok((result, self.time))
    }
}

/// Payload of `/v5/market/kline`
///
/// Each entry is a 7-element string array:
/// `[start, open, high, low, close, volume, turnover]`, newest first.
#[derive(Debug, Deserialize)]
pub struct KlineResult {
    /// Raw kline rows
    pub list: Vec<Vec<String>>,
}

impl KlineResult {
    /// Decode the rows into [`Kline`] records, oldest first
    ///
    /// REST rows carry no confirm flag; a bucket is final once its end time
    /// is at or before the server time, so everything except a still-open
    /// newest bucket is marked confirmed.
    pub fn into_klines(self, interval_ms: i64, server_time: i64) -> RestResult<Vec<Kline>> {
        let mut klines = Vec::with_capacity(self.list.len());
        for row in self.list.into_iter().rev() {
            if row.len() < 7 {
                return Err(RestError::InvalidResponse(format!(
                    "kline row has {} fields, expected 7",
                    row.len()
                )));
            }
            let start: i64 = row[0]
                .parse()
                .map_err(|e| RestError::InvalidResponse(format!("bad kline start: {e}")))?;
            let end = start + interval_ms - 1;
            klines.push(Kline {
                start,
                end,
                open: parse_decimal(&row[1])?,
                high: parse_decimal(&row[2])?,
                low: parse_decimal(&row[3])?,
                close: parse_decimal(&row[4])?,
                volume: parse_decimal(&row[5])?,
                turnover: parse_decimal(&row[6])?,
                confirmed: end <= server_time,
            });
        }
        Ok(klines)
    }
}

fn parse_decimal(s: &str) -> RestResult<Decimal> {
    Decimal::from_str(s).map_err(|e| RestError::InvalidResponse(format!("bad decimal {s:?}: {e}")))
}

/// One row of `/v5/market/recent-trade`
#[derive(Debug, Deserialize)]
pub struct RestTrade {
    /// Exchange trade id
    #[serde(rename = "execId")]
    pub exec_id: String,
    /// Trading pair
    pub symbol: String,
    /// Price
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Quantity
    #[serde(rename = "size", with = "rust_decimal::serde::str")]
    pub size: Decimal,
    /// Taker side
    pub side: Side,
    /// Execution time (ms since epoch, sent as a string)
    #[serde(deserialize_with = "ts_ms::deserialize")]
    pub time: i64,
}

impl From<RestTrade> for Trade {
    fn from(t: RestTrade) -> Self {
        Trade {
            id: t.exec_id,
            time: t.time,
            symbol: t.symbol,
            side: t.side,
            price: t.price,
            qty: t.size,
        }
    }
}

/// Plain list payload (`/v5/market/recent-trade`)
#[derive(Debug, Deserialize)]
pub struct ListResult<T> {
    /// Result rows
    pub list: Vec<T>,
}

/// Cursor-paginated list payload (`/v5/order/realtime`, `/v5/position/list`)
#[derive(Debug, Deserialize)]
pub struct PagedResult<T> {
    /// Result rows for this page
    pub list: Vec<T>,
    /// Cursor for the next page; empty or absent on the last page
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: Option<String>,
}

impl<T> PagedResult<T> {
    /// Cursor to fetch the next page, if there is one
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_page_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// One account entry of `/v5/account/wallet-balance`
#[derive(Debug, Deserialize)]
pub struct WalletAccount {
    /// Account type ("UNIFIED", "CONTRACT", ...)
    #[serde(rename = "accountType")]
    pub account_type: String,
    /// Per-asset balances
    #[serde(default)]
    pub coin: Vec<bybit_types::Balance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kline_rows_decode_oldest_first() {
        let result = KlineResult {
            list: vec![
                // Newest first, as the API sends them
                vec![
                    "1672324800000".into(),
                    "16649.5".into(),
                    "16677".into(),
                    "16608".into(),
                    "16640".into(),
                    "2.081".into(),
                    "34666.4".into(),
                ],
                vec![
                    "1672324500000".into(),
                    "16600".into(),
                    "16650".into(),
                    "16580".into(),
                    "16649.5".into(),
                    "1.5".into(),
                    "24900".into(),
                ],
            ],
        };

        let klines = result.into_klines(300_000, 1672324900000).unwrap();
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].start, 1672324500000);
        assert_eq!(klines[1].start, 1672324800000);
        // Older bucket closed before server time, newest still open
        assert!(klines[0].confirmed);
        assert!(!klines[1].confirmed);
        assert_eq!(klines[1].open, dec!(16649.5));
    }

    #[test]
    fn test_envelope_error_code() {
        let resp: ApiResponse<ListResult<RestTrade>> = serde_json::from_str(
            r#"{"retCode": 10001, "retMsg": "params error", "result": null, "time": 1}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, RestError::Api { code: 10001, .. }));
    }

    #[test]
    fn test_paged_cursor_empty_means_done() {
        let page: PagedResult<RestTrade> = serde_json::from_str(
            r#"{"list": [], "nextPageCursor": ""}"#,
        )
        .unwrap();
        assert!(page.next_cursor().is_none());
    }
}
