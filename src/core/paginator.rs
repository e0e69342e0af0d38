use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::ExchangeError;
use crate::core::http::Params;
use crate::core::normalizer;
use crate::core::types::Result;

/// 可分页读取的数据源，每次调用发出一个已签名的 GET 请求
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, endpoint: &str, params: &Params) -> Result<Value>;
}

/// 基于游标的通用分页
///
/// 每页取最后一条记录的 `position_field`，加一后写回 `page_key` 作为下一页起点，
/// 直到返回空页为止。游标必须是严格递增的整数，否则无法保证终止。
pub struct Paginator<'a> {
    endpoint: &'a str,
    page_key: &'a str,
    position_field: &'a str,
}

impl<'a> Paginator<'a> {
    pub fn new(endpoint: &'a str, page_key: &'a str, position_field: &'a str) -> Self {
        Self {
            endpoint,
            page_key,
            position_field,
        }
    }

    pub async fn fetch_all<S>(&self, source: &S, mut params: Params) -> Result<Vec<Value>>
    where
        S: PageSource + ?Sized,
    {
        let mut records = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = source.fetch_page(self.endpoint, &params).await?;
            let items = match page {
                Value::Array(items) => items,
                other => {
                    return Err(ExchangeError::ParseError(format!(
                        "分页接口 {} 返回的不是数组: {}",
                        self.endpoint, other
                    )))
                }
            };

            let Some(last) = items.last() else {
                break;
            };

            let cursor = last
                .get(self.position_field)
                .ok_or_else(|| {
                    ExchangeError::ParseError(format!(
                        "分页记录缺少游标字段 {}",
                        self.position_field
                    ))
                })
                .and_then(normalizer::integer_from)?;

            pages += 1;
            log::debug!(
                "📄 {} 第{}页: {}条记录，下一页 {}={}",
                self.endpoint,
                pages,
                items.len(),
                self.page_key,
                cursor + 1
            );

            records.extend(items);
            params.insert(self.page_key, cursor + 1);
        }

        Ok(records)
    }
}

/// `Paginator::new(...).fetch_all(...)` 的简写
pub async fn fetch_all<S>(
    source: &S,
    endpoint: &str,
    params: Params,
    page_key: &str,
    position_field: &str,
) -> Result<Vec<Value>>
where
    S: PageSource + ?Sized,
{
    Paginator::new(endpoint, page_key, position_field)
        .fetch_all(source, params)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        pages: Mutex<VecDeque<Value>>,
        seen: Mutex<Vec<Params>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Value>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, _endpoint: &str, params: &Params) -> Result<Value> {
            self.seen.lock().unwrap().push(params.clone());
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or(json!([])))
        }
    }

    fn page(start: i64, count: i64) -> Value {
        Value::Array(
            (start..start + count)
                .map(|id| json!({"orderId": id, "time": 1_700_000_000_000i64 + id}))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_fetch_all_concatenates_until_empty_page() {
        let source = ScriptedSource::new(vec![page(1, 100), page(101, 100), json!([])]);
        let params = Params::new().with("symbol", "BTCUSDT").with("orderId", 1);

        let records = fetch_all(&source, "/api/v3/allOrders", params, "orderId", "orderId")
            .await
            .unwrap();

        assert_eq!(records.len(), 200);
        let ids: Vec<i64> = records.iter().map(|r| r["orderId"].as_i64().unwrap()).collect();
        assert_eq!(ids, (1..=200).collect::<Vec<_>>());

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].get("orderId"), Some(&json!(101)));
        assert_eq!(seen[2].get("orderId"), Some(&json!(201)));
        // 游标原位更新，参数顺序不变
        assert_eq!(seen[2].query_string(), "symbol=BTCUSDT&orderId=201");
    }

    #[tokio::test]
    async fn test_string_cursor_is_accepted() {
        let source = ScriptedSource::new(vec![json!([{"id": "41"}, {"id": "42"}])]);
        let records = fetch_all(&source, "/trades", Params::new(), "fromId", "id")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(source.seen.lock().unwrap()[1].get("fromId"), Some(&json!(43)));
    }

    #[tokio::test]
    async fn test_missing_cursor_is_parse_error() {
        let source = ScriptedSource::new(vec![json!([{"price": "1"}])]);
        let err = fetch_all(&source, "/orders", Params::new(), "startTime", "time")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_non_integer_cursor_is_parse_error() {
        let source = ScriptedSource::new(vec![json!([{"time": "soon"}])]);
        let err = fetch_all(&source, "/orders", Params::new(), "startTime", "time")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_first_page_empty() {
        let source = ScriptedSource::new(vec![json!([])]);
        let records = fetch_all(&source, "/orders", Params::new(), "startTime", "time")
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(source.seen.lock().unwrap().len(), 1);
    }
}
