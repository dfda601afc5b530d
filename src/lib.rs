pub mod alert;
pub mod analysis;
pub mod candle;
pub mod comfy_table;
pub mod find_tickers;
pub mod indicators;
pub mod klines;
pub mod risk;
pub mod rules;
pub mod storage_utils;
pub mod watchlist;
