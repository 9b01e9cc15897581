//! Built-in snippet templates.
//!
//! The gallery is a fixed, ordered list; the order here is the display order.
//! Titles and the few strings embedded in template code are localized.

use std::fmt;

/// Display locale for template titles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// Resolve a host language tag (`en-US`, `zh_CN`, `ja`...).
    /// Anything that is not Chinese falls back to English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "zh" => Locale::Zh,
            _ => Locale::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, predefined snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Display label, already resolved for the gallery's locale
    pub title: String,
    /// Original source text
    pub code: String,
}

impl Template {
    fn new(title: &str, code: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            code: code.into(),
        }
    }
}

struct Strings {
    hello_world: &'static str,
    active_table: &'static str,
    record_list: &'static str,
    field_list: &'static str,
    http_example: &'static str,
    add_record: &'static str,
    new_row: &'static str,
    success: &'static str,
}

const EN: Strings = Strings {
    hello_world: "Hello world",
    active_table: "Get the active table name",
    record_list: "List record ids of the active table",
    field_list: "List field metadata of the active table",
    http_example: "Send an HTTP request",
    add_record: "Append a record",
    new_row: "New row",
    success: "Success",
};

const ZH: Strings = Strings {
    hello_world: "你好，世界",
    active_table: "获取当前数据表名称",
    record_list: "获取当前数据表的记录 ID 列表",
    field_list: "获取当前数据表的字段信息",
    http_example: "发送 HTTP 请求",
    add_record: "新增一条记录",
    new_row: "新增的一行",
    success: "成功",
};

/// The built-in gallery for a locale
pub fn builtin_templates(locale: Locale) -> Vec<Template> {
    let s = match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    };

    vec![
        Template::new(
            s.hello_world,
            [
                r#"log("hello world");"#,
                "",
                "// load a helper module over HTTP",
                r#"// import "https://example.com/helpers.rhai" as helpers;"#,
            ]
            .join("\n"),
        ),
        Template::new(
            s.active_table,
            [
                "let table = bitable.active_table();",
                "let name = table.name();",
                "log(name);",
            ]
            .join("\n"),
        ),
        Template::new(
            s.record_list,
            [
                "let table = bitable.active_table();",
                "let ids = table.record_ids();",
                "log(ids);",
            ]
            .join("\n"),
        ),
        Template::new(
            s.field_list,
            [
                "fn main(bitable) {",
                "    let table = bitable.active_table();",
                "    let fields = table.field_meta_list();",
                "    log(fields);",
                "}",
            ]
            .join("\n"),
        ),
        Template::new(
            s.http_example,
            [
                "let body = http(#{",
                r#"    method: "post","#,
                r#"    url: "https://base-translator-api.replit.app/cell_translate","#,
                r#"    data: #{ q: "测试脚本", from: "zh", to: "en" },"#,
                r#"    headers: #{ "Content-Type": "application/x-www-form-urlencoded" }"#,
                "});",
                "log(body);",
            ]
            .join("\n"),
        ),
        Template::new(
            s.add_record,
            [
                "fn main(bitable) {".to_string(),
                "    let table = bitable.active_table();".to_string(),
                "    let fields = table.field_meta_list();".to_string(),
                "    let values = #{};".to_string(),
                format!("    values[fields[0].id] = \"{}\";", s.new_row),
                "    table.add_record(#{ fields: values });".to_string(),
                format!("    log(\"{}\");", s.success),
                "}".to_string(),
            ]
            .join("\n"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_tags() {
        assert_eq!(Locale::from_tag("zh"), Locale::Zh);
        assert_eq!(Locale::from_tag("zh-CN"), Locale::Zh);
        assert_eq!(Locale::from_tag("ZH_tw"), Locale::Zh);
        assert_eq!(Locale::from_tag("en-US"), Locale::En);
        assert_eq!(Locale::from_tag("ja"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn gallery_order_is_stable_across_locales() {
        let en = builtin_templates(Locale::En);
        let zh = builtin_templates(Locale::Zh);
        assert_eq!(en.len(), 6);
        assert_eq!(zh.len(), 6);

        // Same snippets, different labels
        assert_eq!(en[1].code, zh[1].code);
        assert_ne!(en[0].title, zh[0].title);
        assert!(en[3].code.starts_with("fn main(bitable)"));
        assert!(zh[5].code.contains("新增的一行"));
        assert!(en[5].code.contains("New row"));
    }
}
