use std::time::Duration;

use tracing::{info, instrument};

/// 耗时的中文显示：不足 1 秒显示毫秒，不足 1 分钟显示秒和毫秒
pub fn format_elapsed(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let ms_remaining = total_ms % 1000;

    if total_ms >= 60000 {
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        if ms_remaining > 0 {
            format!("{}分{}秒{}毫秒", mins, secs, ms_remaining)
        } else {
            format!("{}分{}秒", mins, secs)
        }
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        if ms_remaining > 0 {
            format!("{}秒{}毫秒", secs, ms_remaining)
        } else {
            format!("{}秒", secs)
        }
    } else {
        format!("{}毫秒", total_ms)
    }
}

#[instrument(skip_all)]
pub fn display_elapsed_time(what: &str, duration: Duration) {
    info!("✅ {}完成！耗时: {}", what, format_elapsed(duration));
}

/// 截断过长的标题，按字符计
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(250, "250毫秒")]
    #[case(1000, "1秒")]
    #[case(1500, "1秒500毫秒")]
    #[case(120_000, "2分0秒")]
    #[case(61_001, "1分1秒1毫秒")]
    fn elapsed_formats(#[case] ms: u64, #[case] expected: &str) {
        assert_eq!(format_elapsed(Duration::from_millis(ms)), expected);
    }

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate("SHADOW SLAVE", 20), "SHADOW SLAVE");
        assert_eq!(truncate("一二三四五", 3), "一二…");
    }
}
