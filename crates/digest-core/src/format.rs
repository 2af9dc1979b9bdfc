//! Pure helpers used when rendering digest records: day-over-day change,
//! display formatting of amounts and counts, and icon path naming.

/// Separator between digit groups of the integer part.
pub const THOUSANDS_SEPARATOR: char = ' ';
/// Separator between the integer and fractional part.
pub const DECIMAL_SEPARATOR: char = ',';
/// Placeholder substituted by [`icon_path`].
pub const ICON_NAME_PLACEHOLDER: &str = "{name}";

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
  let rounded = (value * 100.0).round() / 100.0;
  // Collapse -0.0 so it never renders as "-0".
  if rounded == 0.0 { 0.0 } else { rounded }
}

/// Percentage change from `previous` to `current`, rounded to two decimals.
///
/// A missing or zero `previous` yields `0.0`, as does a missing `current`
/// against a zero base. The result is always finite.
pub fn change_percent(current: Option<f64>, previous: Option<f64>) -> f64 {
  let previous = match previous {
    Some(p) if p != 0.0 && p.is_finite() => p,
    _ => return 0.0,
  };
  let current = current.unwrap_or(0.0);
  let change = (current - previous) / previous * 100.0;
  if change.is_finite() { round2(change) } else { 0.0 }
}

/// Format a monetary amount with two decimals, e.g. `1234.5` → `"1 234,50"`.
/// `None` (and non-finite input) renders as `"0"`.
pub fn format_amount(value: Option<f64>) -> String {
  let Some(value) = value.filter(|v| v.is_finite()) else {
    return "0".to_owned();
  };
  let fixed = format!("{:.2}", value.abs());
  let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));
  let negative = value < 0.0 && fixed != "0.00";

  let mut out = String::with_capacity(fixed.len() + 4);
  if negative {
    out.push('-');
  }
  out.push_str(&group_digits(int_part));
  out.push(DECIMAL_SEPARATOR);
  out.push_str(frac_part);
  out
}

/// Format a counter without decimals, e.g. `12345` → `"12 345"`.
/// `None` renders as `"0"`.
pub fn format_count(value: Option<u64>) -> String {
  group_digits(&value.unwrap_or(0).to_string())
}

/// Insert [`THOUSANDS_SEPARATOR`] every three digits from the right.
fn group_digits(digits: &str) -> String {
  let len = digits.len();
  let mut out = String::with_capacity(len + len / 3);
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (len - i) % 3 == 0 {
      out.push(THOUSANDS_SEPARATOR);
    }
    out.push(ch);
  }
  out
}

/// Derive an icon path for a project: the name is lower-cased, spaces become
/// underscores, and the result replaces `{name}` in `template`.
///
/// This is a naming convention only; the file is not checked for existence.
pub fn icon_path(template: &str, project_name: &str) -> String {
  let slug = project_name.to_lowercase().replace(' ', "_");
  template.replace(ICON_NAME_PLACEHOLDER, &slug)
}
