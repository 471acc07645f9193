use crate::normalizer::PROJECTION_WEEKS;
use crate::schema::AnalyticsBundle;
use crate::utils::{extract_amounts, parse_amount};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const SECTION_HEADERS: [&str; 5] = [
    "Schedule",
    "Profits",
    "Explanations",
    "External Tool",
    "External Explanation",
];

/// Fallback weekly profit rate, as a share of the best per-acre profit.
const DEFAULT_WEEKLY_RATE_SHARE: f64 = 0.1;
const TEXT_REVENUE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProfit {
    pub name: String,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExplanation {
    pub name: String,
    pub explanation: String,
}

/// The third-party tool the model recommends buying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    pub name: String,
    pub cost: Option<f64>,
    pub predicted_profit: Option<f64>,
    pub weekly_profit_rate: Option<f64>,
}

/// Everything recoverable from one analysis reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schedule: Vec<String>,
    pub profits: Vec<ToolProfit>,
    pub explanations: Vec<ToolExplanation>,
    pub external_tool: Option<ExternalTool>,
    pub external_explanation: Option<String>,
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^[\s>*#_\-]*(schedule|profits|explanations|external tool|external explanation)[*_]*\s*:[*_]*[ \t]*(.*)$",
        )
        .expect("header pattern is valid")
    })
}

fn strip_markup(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | '>' | '_'))
        .trim_end_matches(|c: char| matches!(c, '*' | '_'))
        .trim()
}

/// Body of the first `header:` section. Content on the header line wins;
/// otherwise the following lines up to a blank line or the next header are
/// joined with `joiner`.
fn section_body(text: &str, header: &str, joiner: &str) -> Option<String> {
    let pattern = header_pattern();
    let found = pattern
        .captures_iter(text)
        .find(|caps| caps[1].eq_ignore_ascii_case(header))?;

    let inline = strip_markup(&found[2]);
    if !inline.is_empty() {
        return Some(inline.to_string());
    }

    let whole = found.get(0)?;
    let mut lines = Vec::new();
    for line in text[whole.end()..].lines().skip(1) {
        if line.trim().is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        if pattern.is_match(line) {
            break;
        }
        lines.push(strip_markup(line).to_string());
    }

    if lines.is_empty() {
        // The header exists but carries nothing.
        Some(String::new())
    } else {
        Some(lines.join(joiner))
    }
}

/// Splits `a: 1, b: 2` into named pairs. Fragments without a colon belong to
/// the next name (names may contain ", "); the last colon separates the value
/// (names may contain ": ").
fn split_named_pairs(body: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending = String::new();

    for fragment in body.split(", ") {
        if !pending.is_empty() {
            pending.push_str(", ");
        }
        pending.push_str(fragment);

        if let Some((name, value)) = pending.rsplit_once(':') {
            let name = strip_markup(name).to_string();
            if !name.is_empty() {
                pairs.push((name, value.trim().to_string()));
            }
            pending.clear();
        }
    }

    pairs
}

fn parse_profits(body: &str) -> Vec<ToolProfit> {
    split_named_pairs(body)
        .into_iter()
        .filter_map(|(name, value)| match parse_amount(&value) {
            Some(profit) if profit > 0.0 && profit.is_finite() => Some(ToolProfit { name, profit }),
            _ => {
                debug!("Discarding profit entry '{}: {}'", name, value);
                None
            }
        })
        .collect()
}

fn parse_external_tool(body: &str) -> ExternalTool {
    let (name, figures) = match body.split_once(':') {
        Some((name, rest)) => (strip_markup(name).to_string(), rest),
        None => {
            let cut = body
                .find(|c: char| c.is_ascii_digit() || c == '$')
                .unwrap_or(body.len());
            let name = strip_markup(&body[..cut]).trim_end_matches(',').trim();
            (name.to_string(), &body[cut..])
        }
    };
    let amounts = extract_amounts(figures);

    ExternalTool {
        name,
        cost: amounts.first().copied(),
        predicted_profit: amounts.get(1).copied(),
        weekly_profit_rate: amounts.get(2).copied(),
    }
}

fn parse_explanations(body: &str, known_tools: &[ToolProfit]) -> Vec<ToolExplanation> {
    // Explanations are prose and contain commas, so anchor on the tool names
    // already read from the profits line when we can.
    let anchors = explanation_anchors(body, known_tools);
    if anchors.is_empty() {
        return split_named_pairs(body)
            .into_iter()
            .map(|(name, explanation)| ToolExplanation { name, explanation })
            .collect();
    }

    let mut explanations = Vec::with_capacity(anchors.len());
    for (i, (pos, name)) in anchors.iter().enumerate() {
        let start = pos + name.len() + 1;
        let end = anchors.get(i + 1).map(|(next, _)| *next).unwrap_or(body.len());
        let Some(text) = body.get(start..end) else {
            debug!("Explanation anchors out of order, splitting on commas instead");
            return split_named_pairs(body)
                .into_iter()
                .map(|(name, explanation)| ToolExplanation { name, explanation })
                .collect();
        };
        explanations.push(ToolExplanation {
            name: name.to_string(),
            explanation: text.trim().trim_end_matches(',').trim().to_string(),
        });
    }
    explanations
}

/// Positions where a known `<name>:` pair begins. A pair starts at the top of
/// the body or right after `", "`, never inside a previous pair's name, and
/// each name anchors once. The longest matching name wins at a boundary.
fn explanation_anchors<'a>(body: &str, known_tools: &'a [ToolProfit]) -> Vec<(usize, &'a str)> {
    let boundaries =
        std::iter::once(0).chain(body.match_indices(", ").map(|(pos, sep)| pos + sep.len()));

    let mut anchors: Vec<(usize, &'a str)> = Vec::new();
    let mut cursor = 0;
    for boundary in boundaries {
        if boundary < cursor {
            continue;
        }
        let rest = &body[boundary..];
        let matched = known_tools
            .iter()
            .map(|tool| tool.name.as_str())
            .filter(|name| !name.is_empty())
            .filter(|name| !anchors.iter().any(|(_, taken)| taken == name))
            .filter(|name| {
                rest.strip_prefix(name)
                    .is_some_and(|after| after.starts_with(':'))
            })
            .max_by_key(|name| name.len());

        if let Some(name) = matched {
            anchors.push((boundary, name));
            cursor = boundary + name.len() + 1;
        }
    }
    anchors
}

impl AnalysisReport {
    /// Reads the `Profits:`, `Explanations:`, `External Tool:`,
    /// `External Explanation:` and `Schedule:` sections. Missing or malformed
    /// sections leave their field empty.
    pub fn parse(text: &str) -> Self {
        let profits = section_body(text, "Profits", ", ")
            .map(|body| parse_profits(&body))
            .unwrap_or_default();

        let explanations = section_body(text, "Explanations", ", ")
            .map(|body| parse_explanations(&body, &profits))
            .unwrap_or_default();

        let external_tool = section_body(text, "External Tool", ", ")
            .filter(|body| !body.is_empty())
            .map(|body| parse_external_tool(&body));

        let external_explanation = section_body(text, "External Explanation", " ")
            .filter(|body| !body.is_empty());

        let schedule = section_body(text, "Schedule", "\n")
            .map(|body| {
                body.lines()
                    .map(str::trim)
                    .filter(|line| line.to_ascii_lowercase().starts_with("day"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            schedule,
            profits,
            explanations,
            external_tool,
            external_explanation,
        }
    }

    /// The tool with the highest estimated profit.
    pub fn best_tool(&self) -> Option<&ToolProfit> {
        self.profits
            .iter()
            .max_by(|a, b| a.profit.total_cmp(&b.profit))
    }

    pub fn explanation_for(&self, tool: &str) -> Option<&str> {
        self.explanations
            .iter()
            .find(|e| e.name == tool)
            .map(|e| e.explanation.as_str())
    }

    /// Builds chart data straight from the parsed figures. Returns `None`
    /// unless at least one valid profit and the external tool line exist.
    /// The result is not normalized.
    pub fn to_bundle(&self) -> Option<AnalyticsBundle> {
        let tool = self.external_tool.as_ref()?;
        let max_profit = self.best_tool()?.profit;

        let weekly_rate = tool
            .weekly_profit_rate
            .unwrap_or(max_profit * DEFAULT_WEEKLY_RATE_SHARE);

        let projected_profits: Vec<f64> = (1..=PROJECTION_WEEKS)
            .map(|week| (max_profit + weekly_rate * week as f64).round())
            .collect();

        let break_even_point = tool.cost.unwrap_or_else(|| {
            projected_profits
                .iter()
                .copied()
                .fold(f64::MIN, f64::max)
        });

        Some(AnalyticsBundle {
            tillage_names: self.profits.iter().map(|p| p.name.clone()).collect(),
            profits: self.profits.iter().map(|p| p.profit).collect(),
            revenue: self
                .profits
                .iter()
                .map(|p| (p.profit * TEXT_REVENUE_MULTIPLIER).round())
                .collect(),
            projected_profits,
            break_even_point,
        })
    }
}

/// Parses an analysis reply straight into (unnormalized) chart data.
pub fn parse_analytics_text(text: &str) -> Option<AnalyticsBundle> {
    let bundle = AnalysisReport::parse(text).to_bundle();
    if bundle.is_none() {
        debug!("Analysis text did not contain usable Profits/External Tool lines");
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPLY: &str = "Schedule:\n\
Day 1: Deep Rip, 5 acres, $375, $600\n\
Day 2: No-Till Planter, 10.4 acres, $572, $900\n\
\n\
The best overall tool is the No-Till Planter.\n\
\n\
Profits: No-Till Planting (Farmer Owned): $120, Co-op Hired Resource: Custom Moldboard Plowing: $1,050, Vertical Tillage: $-5\n\
Explanations: No-Till Planting (Farmer Owned): keeps structure, low cost (under budget), Co-op Hired Resource: Custom Moldboard Plowing: deep, but compacts clay (over budget)\n\
External Tool: DrainMaster 3000: $12,000, $2,400, $300\n\
External Explanation: Tile drainage fixes the ponding in Reddick clay loam.";

    #[test]
    fn test_literal_profits_and_external_tool() {
        let text = "Profits: Plow A: $120, Plow B: $95\nExternal Tool: DroneScout: $2500, $400, $80";
        let bundle = parse_analytics_text(text).unwrap();

        assert_eq!(bundle.tillage_names, vec!["Plow A", "Plow B"]);
        assert_eq!(bundle.profits, vec![120.0, 95.0]);
        assert_eq!(bundle.break_even_point, 2500.0);
        assert_eq!(bundle.revenue, vec![180.0, 143.0]);
        assert_eq!(
            bundle.projected_profits,
            vec![200.0, 280.0, 360.0, 440.0, 520.0, 600.0]
        );
    }

    #[test]
    fn test_full_reply_sections() {
        let report = AnalysisReport::parse(FULL_REPLY);

        assert_eq!(report.schedule.len(), 2);
        assert!(report.schedule[0].starts_with("Day 1"));

        assert_eq!(report.profits.len(), 2, "non-positive profit is dropped");
        assert_eq!(
            report.profits[1].name,
            "Co-op Hired Resource: Custom Moldboard Plowing"
        );
        assert_eq!(report.profits[1].profit, 1050.0);
        assert_eq!(
            report.best_tool().unwrap().name,
            "Co-op Hired Resource: Custom Moldboard Plowing"
        );

        assert_eq!(
            report.explanation_for("No-Till Planting (Farmer Owned)"),
            Some("keeps structure, low cost (under budget)")
        );

        let tool = report.external_tool.as_ref().unwrap();
        assert_eq!(tool.name, "DrainMaster 3000");
        assert_eq!(tool.cost, Some(12000.0));
        assert_eq!(tool.predicted_profit, Some(2400.0));
        assert_eq!(tool.weekly_profit_rate, Some(300.0));
        assert!(report
            .external_explanation
            .as_deref()
            .unwrap()
            .contains("Reddick"));
    }

    #[test]
    fn test_missing_external_tool_yields_no_bundle() {
        assert!(parse_analytics_text("Profits: Plow A: $120").is_none());
    }

    #[test]
    fn test_no_valid_profits_yields_no_bundle() {
        let text = "Profits: Plow A: unknown, Plow B: $0\nExternal Tool: Drone: $2500";
        assert!(parse_analytics_text(text).is_none());
    }

    #[test]
    fn test_missing_trailing_figures_fall_back() {
        let text = "Profits: Plow A: $200\nExternal Tool: Drone";
        let report = AnalysisReport::parse(text);
        let tool = report.external_tool.as_ref().unwrap();
        assert_eq!(tool.name, "Drone");
        assert_eq!(tool.cost, None);
        assert_eq!(tool.weekly_profit_rate, None);

        let bundle = report.to_bundle().unwrap();
        // weekly rate falls back to 10% of the best profit
        assert_eq!(bundle.projected_profits[0], 220.0);
        assert_eq!(bundle.projected_profits[5], 320.0);
        assert_eq!(bundle.break_even_point, 320.0);
    }

    #[test]
    fn test_markdown_and_multiline_profits() {
        let text = "**Profits:**\n- Disk: $80\n- Rip: $110\n\n**External Tool:** Sensor: $900, $150, $25";
        let bundle = parse_analytics_text(text).unwrap();
        assert_eq!(bundle.tillage_names, vec!["Disk", "Rip"]);
        assert_eq!(bundle.break_even_point, 900.0);
    }

    #[test]
    fn test_names_containing_commas() {
        let pairs = split_named_pairs("Disk (Owned, Secondary): $80, Rip: $110");
        assert_eq!(pairs[0].0, "Disk (Owned, Secondary)");
        assert_eq!(pairs[1].1, "$110");
    }

    #[test]
    fn test_explanations_with_shared_suffix_names() {
        let text = "Profits: Big Disk: $120, Disk: $95\n\
Explanations: Big Disk: wide, Disk: narrow\n\
External Tool: Drone: $2500, $400, $80";
        let report = AnalysisReport::parse(text);

        assert_eq!(report.explanations.len(), 2);
        assert_eq!(report.explanation_for("Big Disk"), Some("wide"));
        assert_eq!(report.explanation_for("Disk"), Some("narrow"));
        assert!(report.to_bundle().is_some());
    }

    #[test]
    fn test_explanations_with_repeated_profit_names() {
        let report = AnalysisReport::parse("Profits: Disk: $80, Disk: $90\nExplanations: Disk: cheap");

        assert_eq!(report.profits.len(), 2);
        assert_eq!(report.explanations.len(), 1);
        assert_eq!(report.explanation_for("Disk"), Some("cheap"));
    }

    #[test]
    fn test_tool_named_inside_another_explanation() {
        let text = "Profits: Disk: $80, Rip: $110\n\
Explanations: Rip: deeper than Disk: fewer passes, Disk: cheap";
        let report = AnalysisReport::parse(text);

        assert_eq!(
            report.explanation_for("Rip"),
            Some("deeper than Disk: fewer passes")
        );
        assert_eq!(report.explanation_for("Disk"), Some("cheap"));
    }

    #[test]
    fn test_explanations_without_known_names_split_on_pairs() {
        let report = AnalysisReport::parse("Profits: Disk: $80\nExplanations: Harrow: light, Roller: firm");

        assert_eq!(report.explanations.len(), 2);
        assert_eq!(report.explanation_for("Harrow"), Some("light"));
        assert_eq!(report.explanation_for("Disk"), None);
    }
}
