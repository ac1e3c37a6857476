/// Key processing utility functions / 对象键处理工具函数

/// Clean and normalize an object key / 清理和规范化对象键
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Drop empty and `.` segments / 去掉空段和 `.`
/// 3. `..` removes the previous segment, never escaping the root / `..` 回退一级，不越过根
/// The result has no leading or trailing `/` / 结果不以 / 开头或结尾
pub fn clean_key(key: &str) -> String {
    let key = key.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for part in key.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    parts.join("/")
}

/// Join two key fragments with a single separator / 拼接两个键片段
pub fn join_key(base: &str, name: &str) -> String {
    let base = clean_key(base);
    let name = clean_key(name);

    match (base.is_empty(), name.is_empty()) {
        (true, _) => name,
        (false, true) => base,
        (false, false) => format!("{}/{}", base, name),
    }
}

/// Get file extension of the last path segment (lowercase) / 获取扩展名（小写）
/// Returns None when the segment has no `.` / 没有扩展名时返回 None
pub fn get_ext(path: &str) -> Option<String> {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file_name
        .rfind('.')
        .map(|idx| file_name[idx + 1..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_key() {
        assert_eq!(clean_key(""), "");
        assert_eq!(clean_key("/"), "");
        assert_eq!(clean_key("."), "");
        assert_eq!(clean_key("../.."), "");
        assert_eq!(clean_key("a/b/c"), "a/b/c");
        assert_eq!(clean_key("/a/b/c/"), "a/b/c");
        assert_eq!(clean_key("a\\b\\c"), "a/b/c");
        assert_eq!(clean_key("/a//b///c"), "a/b/c");
        assert_eq!(clean_key("/a/./b/../c"), "a/c");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "img/a.png"), "img/a.png");
        assert_eq!(join_key("assets", ""), "assets");
        assert_eq!(join_key("assets/", "/img/a.png"), "assets/img/a.png");
        assert_eq!(join_key("", ""), "");
    }

    #[test]
    fn test_get_ext() {
        assert_eq!(get_ext("/img/logo.PNG").as_deref(), Some("png"));
        assert_eq!(get_ext("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(get_ext("/css.d/README"), None);
        assert_eq!(get_ext("trailing."), Some(String::new()));
    }
}
