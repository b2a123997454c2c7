//! 输出解析函数

use super::types::PackageInfo;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// 清理终端输出中的 ANSI 转义序列和特殊字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\r' => {
                if chars.peek() != Some(&'\n') && !result.ends_with('\n') {
                    result.push('\n');
                }
            }
            c if c.is_control() && c != '\n' && c != '\t' => {}
            _ => result.push(c),
        }
    }

    let mut cleaned_lines = Vec::new();
    let mut prev_empty = false;

    for line in result.lines().filter(|l| !is_progress_line(l)) {
        let is_empty = line.trim().is_empty();
        if is_empty && prev_empty {
            continue;
        }
        cleaned_lines.push(line);
        prev_empty = is_empty;
    }

    cleaned_lines.join("\n").trim_matches('\n').to_string()
}

/// winget 的旋转指示符（`-` `\` `|` `/`）和下载进度条（`█▒` + 百分比/大小）
fn is_progress_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().all(|c| matches!(c, '-' | '\\' | '|' | '/' | ' ')) && trimmed.len() < 4 {
        return true;
    }
    trimmed.starts_with('█') || trimmed.starts_with('▒')
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ========== winget ==========

/// 表头中的一列：起始显示列 + 标题
struct HeaderColumn {
    start: usize,
    title: String,
}

/// 按显示宽度切分表头单词。winget 按终端显示宽度对齐各列，
/// 中日韩字符占两列，不能按字节或字符计数。
fn header_columns(header: &str) -> Vec<HeaderColumn> {
    let mut columns = Vec::new();
    let mut current: Option<HeaderColumn> = None;
    let mut pos = 0;
    for c in header.chars() {
        if c.is_whitespace() {
            if let Some(column) = current.take() {
                columns.push(column);
            }
        } else {
            current
                .get_or_insert_with(|| HeaderColumn {
                    start: pos,
                    title: String::new(),
                })
                .title
                .push(c);
        }
        pos += c.width().unwrap_or(0);
    }
    columns.extend(current);
    columns
}

/// 表头各列在 `starts` 中的序号
struct WingetColumns {
    starts: Vec<usize>,
    id: usize,
    version: usize,
    source: Option<usize>,
}

impl WingetColumns {
    /// 列顺序固定为 Name、Id、Version、[Available|Match]、[Source]。
    /// 英文标题优先按名字定位，其它语言按位置定位。
    fn from_header(header: &str) -> Option<Self> {
        let columns = header_columns(header);
        if columns.len() < 3 {
            return None;
        }
        let by_title = |title: &str| columns.iter().position(|c| c.title.eq_ignore_ascii_case(title));

        let (id, version) = match (by_title("Id"), by_title("Version")) {
            (Some(id), Some(version)) if id < version => (id, version),
            _ => (1, 2),
        };
        let source = by_title("Source").or_else(|| (columns.len() >= 5).then(|| columns.len() - 1));
        Some(Self {
            starts: columns.iter().map(|c| c.start).collect(),
            id,
            version,
            source,
        })
    }

    /// 把一行按显示位置分配到各列
    fn split(&self, line: &str) -> Vec<String> {
        let mut cells = vec![String::new(); self.starts.len()];
        let mut pos = 0;
        for c in line.chars() {
            let index = self.starts.iter().rposition(|&s| s <= pos).unwrap_or(0);
            cells[index].push(c);
            pos += c.width().unwrap_or(0);
        }
        cells.into_iter().map(|c| c.trim().to_string()).collect()
    }
}

/// 解析 `winget search` / `winget list` 的定宽表格输出
///
/// ```text
/// Name      Id           Version  Match        Source
/// -------------------------------------------------
/// Git       Git.Git      2.44.0   Moniker: git winget
/// ```
/// 没有可识别的表格时返回 None，由调用方区分"无匹配"和"输出无法解析"。
pub fn parse_winget_table(output: &str) -> Option<Vec<PackageInfo>> {
    let cleaned = clean_terminal_output(output);
    let lines: Vec<&str> = cleaned.lines().collect();

    let sep = lines
        .iter()
        .position(|l| l.trim_start().starts_with("---") && l.trim().chars().all(|c| c == '-'))?;
    if sep == 0 {
        return None;
    }
    let cols = WingetColumns::from_header(lines[sep - 1])?;
    let version_start = cols.starts[cols.version];

    let mut packages = Vec::new();
    for line in &lines[sep + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        // 缩进行和表格后的汇总行（如 "2 upgrades available."）都到不了 Version 列
        if line.starts_with(char::is_whitespace) || line.width() <= version_start {
            continue;
        }
        let cells = cols.split(line);
        let name = cells[0].clone();
        let id = cells[cols.id].clone();
        if name.is_empty() || id.is_empty() || id.contains(' ') {
            log::debug!("跳过无法对齐的 winget 行: {}", line);
            continue;
        }

        packages.push(PackageInfo {
            name,
            id,
            version: non_empty(&cells[cols.version]),
            publisher: cols.source.and_then(|s| non_empty(&cells[s])),
            description: None,
        });
    }
    Some(packages)
}

// ========== brew ==========

/// 解析 `brew search` 输出
///
/// 管道模式下每行一个名字，`==> Formulae` / `==> Casks` 分节标题决定来源
pub fn parse_brew_search(output: &str) -> Vec<PackageInfo> {
    let mut packages = Vec::new();
    let mut section: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(title) = trimmed.strip_prefix("==>") {
            section = match title.trim().to_lowercase().as_str() {
                "formulae" => Some("formula".to_string()),
                "casks" => Some("cask".to_string()),
                _ => None,
            };
            continue;
        }
        // 提示文本，如 "If you meant \"git\" specifically:"
        if trimmed.ends_with(':') || trimmed.contains(char::is_whitespace) {
            continue;
        }
        packages.push(PackageInfo {
            name: trimmed.to_string(),
            id: trimmed.to_string(),
            version: None,
            publisher: section.clone(),
            description: None,
        });
    }
    packages
}

/// 解析 `brew list --versions`：`name ver [ver...]`
pub fn parse_brew_list(output: &str) -> Vec<PackageInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            // 多个版本并存时取最后一个（最新安装）
            let version = parts.last().map(str::to_string);
            Some(PackageInfo {
                name: name.to_string(),
                id: name.to_string(),
                version,
                publisher: None,
                description: None,
            })
        })
        .collect()
}

// ========== apt ==========

/// 解析 `apt-cache search` 输出：`package-name - description`
pub fn parse_apt_search(output: &str) -> Vec<PackageInfo> {
    output
        .lines()
        .filter_map(|line| {
            let (name, description) = line.split_once(" - ")?;
            let name = name.trim();
            if name.is_empty() || name.contains(' ') {
                return None;
            }
            Some(PackageInfo {
                name: name.to_string(),
                id: name.to_string(),
                version: None,
                publisher: None,
                description: non_empty(description),
            })
        })
        .collect()
}

/// `dpkg-query -W` 的输出格式
pub const DPKG_QUERY_FORMAT: &str = "${Package}\\t${Version}\\t${db:Status-Abbrev}\\t${binary:Summary}\\n";

/// 解析 `dpkg-query -W -f=DPKG_QUERY_FORMAT`，只保留状态为 `ii` 的包
pub fn parse_dpkg_query(output: &str) -> Vec<PackageInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            let version = fields.next().unwrap_or_default();
            let status = fields.next().unwrap_or_default().trim();
            let summary = fields.next().unwrap_or_default();
            if name.is_empty() || status != "ii" {
                return None;
            }
            Some(PackageInfo {
                name: name.to_string(),
                id: name.to_string(),
                version: non_empty(version),
                publisher: None,
                description: non_empty(summary),
            })
        })
        .collect()
}
