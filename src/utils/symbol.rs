use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::core::error::ExchangeError;
use crate::core::types::{Result, SymbolInfo};

/// 统一格式的分隔符，例如 BTC/USDT
pub const GLOBAL_SEPARATOR: char = '/';

/// 交易所本地交易对格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStyle {
    /// 带分隔符，例如 KuCoin 的 BTC-USDT，转换是无损的
    Separated(char),
    /// 不带分隔符，例如 BTCUSDT，需要根据报价资产推断
    ///
    /// 个别交易所的部分交易对仍带定界符（Bitfinex 的 BTCF0:USTF0）
    Concatenated { delimiter: Option<char> },
}

#[derive(Default)]
struct RegistryState {
    /// 本地格式 -> 统一格式
    local_to_global: HashMap<String, String>,
    /// 统一格式 -> 本地格式
    global_to_local: HashMap<String, String>,
    /// 报价资产，按插入顺序匹配
    quote_assets: Vec<String>,
    /// 备用币种列表，报价资产都匹配失败时使用
    currencies: Vec<String>,
    symbols_info: BTreeMap<String, SymbolInfo>,
}

impl RegistryState {
    fn register(&mut self, local: &str, global: &str) {
        self.local_to_global
            .entry(local.to_string())
            .or_insert_with(|| global.to_string());
        self.global_to_local
            .entry(global.to_string())
            .or_insert_with(|| local.to_string());
    }

    fn add_quote_asset(&mut self, quote_asset: &str) {
        if !self.quote_assets.iter().any(|q| q == quote_asset) {
            self.quote_assets.push(quote_asset.to_string());
        }
    }
}

/// 按后缀匹配推断 (base, quote)，后匹配的覆盖先匹配的
fn match_suffix<'a>(local: &str, candidates: &'a [String]) -> Option<(String, &'a str)> {
    let mut matched = None;
    for quote in candidates {
        if let Some(base) = local.strip_suffix(quote.as_str()) {
            if !base.is_empty() {
                matched = Some((base.to_string(), quote.as_str()));
            }
        }
    }
    matched
}

/// 单个交易所实例持有的交易对注册表
///
/// 负责统一格式（BASE/QUOTE）和交易所本地格式之间的双向转换，
/// 同时缓存 exchange info 返回的交易对元数据。映射和报价资产只增不减。
pub struct SymbolRegistry {
    style: SymbolStyle,
    state: RwLock<RegistryState>,
}

impl SymbolRegistry {
    pub fn new(style: SymbolStyle, quote_assets: &[&str]) -> Self {
        let state = RegistryState {
            quote_assets: quote_assets.iter().map(|q| q.to_string()).collect(),
            ..Default::default()
        };
        Self {
            style,
            state: RwLock::new(state),
        }
    }

    pub fn style(&self) -> SymbolStyle {
        self.style
    }

    /// 统一格式 -> 本地格式
    ///
    /// 无分隔符的交易所优先使用已学习的映射，否则直接去掉分隔符
    pub fn to_local(&self, symbol: &str) -> String {
        match self.style {
            SymbolStyle::Separated(separator) => {
                symbol.replace(GLOBAL_SEPARATOR, &separator.to_string())
            }
            SymbolStyle::Concatenated { .. } => {
                let state = self.state.read().expect("Lock poisoned");
                match state.global_to_local.get(symbol) {
                    Some(local) => local.clone(),
                    None => symbol.replace(GLOBAL_SEPARATOR, ""),
                }
            }
        }
    }

    /// 本地格式 -> 统一格式，无法识别时返回 None
    pub fn to_global(&self, local: &str) -> Option<String> {
        if let Some(global) = self
            .state
            .read()
            .expect("Lock poisoned")
            .local_to_global
            .get(local)
        {
            return Some(global.clone());
        }

        let delimiter = match self.style {
            SymbolStyle::Separated(separator) => Some(separator),
            SymbolStyle::Concatenated { delimiter } => delimiter,
        };

        let mut state = self.state.write().expect("Lock poisoned");

        if let Some(delimiter) = delimiter {
            if let Some((base, quote)) = local.split_once(delimiter) {
                if !base.is_empty() && !quote.is_empty() {
                    let global = format!("{}{}{}", base, GLOBAL_SEPARATOR, quote);
                    state.register(local, &global);
                    if matches!(self.style, SymbolStyle::Concatenated { .. }) {
                        state.add_quote_asset(quote);
                    }
                    return Some(global);
                }
            }
            if matches!(self.style, SymbolStyle::Separated(_)) {
                return None;
            }
        }

        if let Some((base, quote)) = match_suffix(local, &state.quote_assets) {
            let global = format!("{}{}{}", base, GLOBAL_SEPARATOR, quote);
            state.register(local, &global);
            return Some(global);
        }

        if let Some((base, currency)) = match_suffix(local, &state.currencies) {
            let global = format!("{}{}{}", base, GLOBAL_SEPARATOR, currency);
            let currency = currency.to_string();
            state.register(local, &global);
            state.add_quote_asset(&currency);
            log::debug!("通过币种列表识别交易对 {} -> {}", local, global);
            return Some(global);
        }

        None
    }

    /// 与 `to_global` 相同，但无法识别时返回错误
    pub fn resolve_global(&self, local: &str) -> Result<String> {
        self.to_global(local)
            .ok_or_else(|| ExchangeError::UnresolvedSymbol(local.to_string()))
    }

    /// 记录一对映射，已存在时不覆盖
    pub fn register(&self, local: &str, global: &str) {
        self.state
            .write()
            .expect("Lock poisoned")
            .register(local, global);
    }

    /// 用 exchange info 中出现的报价资产替换当前列表
    pub fn set_quote_assets(&self, quote_assets: Vec<String>) {
        if quote_assets.is_empty() {
            return;
        }
        self.state.write().expect("Lock poisoned").quote_assets = quote_assets;
    }

    pub fn add_quote_asset(&self, quote_asset: &str) {
        self.state
            .write()
            .expect("Lock poisoned")
            .add_quote_asset(quote_asset);
    }

    pub fn quote_assets(&self) -> Vec<String> {
        self.state.read().expect("Lock poisoned").quote_assets.clone()
    }

    pub fn set_currencies(&self, currencies: Vec<String>) {
        self.state.write().expect("Lock poisoned").currencies = currencies;
    }

    /// 拆分统一格式为 (base, quote)
    pub fn split(symbol: &str) -> Result<(String, String)> {
        match symbol.split_once(GLOBAL_SEPARATOR) {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok((base.to_string(), quote.to_string()))
            }
            _ => Err(ExchangeError::validation(
                "symbol",
                format!("无效的交易对格式: {}，应为 BASE/QUOTE 格式", symbol),
            )),
        }
    }

    /// 缓存交易对元数据，同时学习其本地格式映射
    pub fn insert_info(&self, info: SymbolInfo) {
        let mut state = self.state.write().expect("Lock poisoned");
        state.register(&info.original_symbol, &info.symbol);
        state.symbols_info.insert(info.symbol.clone(), info);
    }

    pub fn info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.state
            .read()
            .expect("Lock poisoned")
            .symbols_info
            .get(symbol)
            .cloned()
    }

    pub fn all_info(&self) -> Vec<SymbolInfo> {
        self.state
            .read()
            .expect("Lock poisoned")
            .symbols_info
            .values()
            .cloned()
            .collect()
    }

    pub fn has_info(&self) -> bool {
        !self
            .state
            .read()
            .expect("Lock poisoned")
            .symbols_info
            .is_empty()
    }

    /// 已缓存的交易对，`include_all` 为 false 时只返回可交易的
    pub fn symbols(&self, include_all: bool) -> Vec<String> {
        self.state
            .read()
            .expect("Lock poisoned")
            .symbols_info
            .values()
            .filter(|info| include_all || info.is_trading())
            .map(|info| info.symbol.clone())
            .collect()
    }
}
