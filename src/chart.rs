// =============================================================================
// Indicator chart specifications
// =============================================================================
//
// A chart spec maps each output series of an indicator (`result`,
// `bbandsUpper`, ...) to a free-form options object for the charting front
// end. Presets cover the common indicators; `merge` applies user overrides:
//
//   - string override           -> sets `yAxis` on every series
//   - object whose first key
//     names an existing series  -> merges each entry into that series
//   - any other object          -> merged into every series
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Series name → chart options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartSpec(pub Map<String, Value>);

/// Caller-supplied tweak to a chart spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartOverride {
    Axis(String),
    Fields(Map<String, Value>),
}

impl ChartSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0.get(name).and_then(Value::as_object)
    }

    /// Preset for a backend indicator type, if one exists.
    pub fn preset(indicator_type: &str) -> Option<Self> {
        let spec = match indicator_type.to_ascii_lowercase().as_str() {
            "adx" => json!({ "result": { "name": "ADX", "yAxis": "first", "color": "#333333" } }),
            "aroon" => json!({
                "aroonUp": { "name": "Aroon Up", "yAxis": "first", "color": "#6e9270" },
                "aroonDown": { "name": "Aroon Down", "yAxis": "first", "color": "#b54b70" }
            }),
            "bbands" => json!({
                "bbandsUpper": { "name": "Bollinger Upper", "yAxis": "primary", "color": "#f700ff" },
                "bbandsMiddle": { "name": "Bollinger Middle", "yAxis": "primary", "color": "#f700ff", "dashStyle": "Dot" },
                "bbandsLower": { "name": "Bollinger Lower", "yAxis": "primary", "color": "#f700ff" }
            }),
            "di" => json!({
                "diPlus": { "name": "DI+", "yAxis": "first", "color": "#6e9270" },
                "diMinus": { "name": "DI-", "yAxis": "first", "color": "#b54b70" }
            }),
            "ema" => json!({ "result": { "name": "EMA", "yAxis": "primary" } }),
            "sma" => json!({ "result": { "name": "SMA", "yAxis": "primary" } }),
            "macd" => json!({
                "macd": { "name": "MACD", "yAxis": "first", "color": "#080808", "zIndex": 5 },
                "macdSignal": { "name": "MACD Signal", "yAxis": "first", "color": "#f51b28" }
            }),
            "rsi" => json!({ "result": { "name": "RSI", "yAxis": "first" } }),
            _ => return None,
        };
        spec.as_object().cloned().map(ChartSpec)
    }

    /// Preset merged with an optional override; an empty spec when the type
    /// has no preset.
    pub fn for_indicator(indicator_type: &str, overrides: Option<ChartOverride>) -> Self {
        let spec = Self::preset(indicator_type).unwrap_or_default();
        match overrides {
            Some(o) => spec.merge(o),
            None => spec,
        }
    }

    pub fn merge(mut self, overrides: ChartOverride) -> Self {
        match overrides {
            ChartOverride::Axis(axis) => {
                for series in self.0.values_mut().filter_map(Value::as_object_mut) {
                    series.insert("yAxis".to_string(), Value::String(axis.clone()));
                }
            }
            ChartOverride::Fields(fields) => {
                let per_series = fields
                    .keys()
                    .next()
                    .is_some_and(|first| self.0.contains_key(first));

                if per_series {
                    for (name, options) in fields {
                        let Some(series) = self.0.get_mut(&name).and_then(Value::as_object_mut) else {
                            continue;
                        };
                        if let Value::Object(options) = options {
                            series.extend(options);
                        }
                    }
                } else {
                    for series in self.0.values_mut().filter_map(Value::as_object_mut) {
                        series.extend(fields.clone());
                    }
                }
            }
        }
        self
    }
}

impl From<Value> for ChartSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ChartSpec(map),
            _ => ChartSpec::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(v: Value) -> ChartOverride {
        ChartOverride::Fields(v.as_object().cloned().unwrap())
    }

    #[test]
    fn axis_override_sets_every_series() {
        let spec = ChartSpec::for_indicator("aroon", Some(ChartOverride::Axis("second".into())));
        assert_eq!(spec.series("aroonUp").unwrap()["yAxis"], "second");
        assert_eq!(spec.series("aroonDown").unwrap()["yAxis"], "second");
    }

    #[test]
    fn series_keyed_override_touches_named_series() {
        let spec = ChartSpec::preset("di")
            .unwrap()
            .merge(fields(json!({ "diMinus": { "dashStyle": "Dash" } })));
        assert_eq!(spec.series("diMinus").unwrap()["dashStyle"], "Dash");
        assert!(spec.series("diPlus").unwrap().get("dashStyle").is_none());
    }

    #[test]
    fn plain_override_applies_to_all() {
        let spec = ChartSpec::preset("adx")
            .unwrap()
            .merge(fields(json!({ "color": "#FF0000", "yAxis": "third" })));
        let result = spec.series("result").unwrap();
        assert_eq!(result["color"], "#FF0000");
        assert_eq!(result["yAxis"], "third");
        assert_eq!(result["name"], "ADX");
    }

    #[test]
    fn presets_keep_series_in_written_order() {
        let spec = ChartSpec::preset("bbands").unwrap();
        let names: Vec<_> = spec.0.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["bbandsUpper", "bbandsMiddle", "bbandsLower"]);
    }

    #[test]
    fn first_written_key_decides_merge_mode() {
        // "color" sorts before "macdSignal" but is written second.
        let overrides: ChartOverride =
            serde_json::from_str(r##"{"macdSignal": {"color": "#000000"}, "color": "#ffffff"}"##).unwrap();
        let spec = ChartSpec::for_indicator("macd", Some(overrides));
        assert_eq!(spec.series("macdSignal").unwrap()["color"], "#000000");
        assert_eq!(spec.series("macd").unwrap()["color"], "#080808");
        assert!(!spec.0.contains_key("color"));
    }

    #[test]
    fn unknown_type_has_empty_spec() {
        assert!(ChartSpec::preset("ichimoku").is_none());
        assert!(ChartSpec::for_indicator("ichimoku", None).is_empty());
    }

    #[test]
    fn override_deserializes_from_string_or_object() {
        let axis: ChartOverride = serde_json::from_value(json!("first")).unwrap();
        assert_eq!(axis, ChartOverride::Axis("first".into()));
        let obj: ChartOverride = serde_json::from_value(json!({ "color": "red" })).unwrap();
        assert!(matches!(obj, ChartOverride::Fields(_)));
    }
}
