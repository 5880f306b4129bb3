//! 文档组装服务 - 业务能力层
//!
//! 把 (正文, 插图) 排成多页 PDF。
//! 排版规划是纯计算（`plan_layout`），渲染交给 `printpdf`。

use futures::future::try_join_all;
use image::DynamicImage;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument, PdfLayerReference};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::GeneratedDocument;

/// 1pt 对应的毫米数
const PT_TO_MM: f32 = 0.352_778;

/// 排版参数（单位：毫米 / 磅）
#[derive(Debug, Clone)]
pub struct LayoutSettings {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_mm: f32,
    pub font_size_pt: f32,
    pub line_height_factor: f32,
    pub image_text_gap_mm: f32,
    /// Helvetica 平均字宽（相对字号）
    pub avg_char_width_em: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        // A4
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_mm: 10.0,
            font_size_pt: 12.0,
            line_height_factor: 1.2,
            image_text_gap_mm: 10.0,
            avg_char_width_em: 0.5,
        }
    }
}

impl LayoutSettings {
    pub fn content_width(&self) -> f32 {
        self.page_width_mm - 2.0 * self.margin_mm
    }

    pub fn printable_bottom(&self) -> f32 {
        self.page_height_mm - self.margin_mm
    }

    pub fn line_height_mm(&self) -> f32 {
        self.font_size_pt * PT_TO_MM * self.line_height_factor
    }

    pub fn chars_per_line(&self) -> usize {
        let char_width = self.font_size_pt * PT_TO_MM * self.avg_char_width_em;
        ((self.content_width() / char_width).floor() as usize).max(1)
    }
}

/// 已放置的图片（y 从页面顶部起算）
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    /// 对应输入中的第几页内容
    pub source: usize,
    pub x: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// 已放置的一行文字，`baseline` 从页面顶部起算
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub baseline: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannedPage {
    pub image: Option<PlacedImage>,
    pub lines: Vec<PlacedLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPlan {
    pub pages: Vec<PlannedPage>,
}

impl LayoutPlan {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// 排版输入：正文 + 图片像素尺寸
#[derive(Debug, Clone, Copy)]
pub struct LayoutItem<'a> {
    pub text: &'a str,
    pub image_size: (u32, u32),
}

/// 把内置字体（WinAnsi）无法显示的常见排版符号替换为 ASCII
pub fn pdf_safe_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2212}' => out.push('-'),
            '\u{2014}' | '\u{2015}' => out.push_str("--"),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{2009}' | '\u{202F}' => out.push(' '),
            '\u{2022}' => out.push('*'),
            c if (c as u32) < 0x100 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// 按单词折行，保留原文中的换行；超长单词按字符硬切
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        lines.push(current);
    }

    // 去掉末尾空行
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// 规划分页
///
/// 每组内容都从新页面开始：图片缩放到内容宽度（保持宽高比，必要时缩小以放进一页），
/// 正文排在图片下方，超出底边距时换页。
pub fn plan_layout(items: &[LayoutItem<'_>], settings: &LayoutSettings) -> LayoutPlan {
    let mut plan = LayoutPlan::default();
    let line_height = settings.line_height_mm();
    let bottom = settings.printable_bottom();
    let max_chars = settings.chars_per_line();

    for (source, item) in items.iter().enumerate() {
        plan.pages.push(PlannedPage::default());
        let mut y = settings.margin_mm;

        let (px_w, px_h) = item.image_size;
        if px_w > 0 && px_h > 0 {
            let aspect = px_h as f32 / px_w as f32;
            let mut width = settings.content_width();
            let mut height = width * aspect;
            let max_height = bottom - settings.margin_mm;
            if height > max_height {
                height = max_height;
                width = height / aspect;
            }

            if let Some(page) = plan.pages.last_mut() {
                page.image = Some(PlacedImage {
                    source,
                    x: settings.margin_mm,
                    top: y,
                    width,
                    height,
                });
            }
            y += height + settings.image_text_gap_mm;
        }

        for text in wrap_text(&pdf_safe_text(item.text), max_chars) {
            if y + line_height > bottom {
                plan.pages.push(PlannedPage::default());
                y = settings.margin_mm;
            }
            y += line_height;
            if let Some(page) = plan.pages.last_mut() {
                page.lines.push(PlacedLine {
                    text,
                    x: settings.margin_mm,
                    baseline: y,
                });
            }
        }
    }

    plan
}

/// 组装输入：正文 + 已下载的图片字节
#[derive(Debug, Clone)]
pub struct IllustratedPage {
    pub text: String,
    pub image: Vec<u8>,
}

/// 文档组装服务
pub struct DocumentAssembler {
    http: reqwest::Client,
    settings: LayoutSettings,
    title: String,
}

impl DocumentAssembler {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            settings: LayoutSettings::default(),
            title: "Horror Story".to_string(),
        }
    }

    pub fn with_settings(mut self, settings: LayoutSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 下载每页的插图
    pub async fn fetch_images(&self, document: &GeneratedDocument) -> AppResult<Vec<IllustratedPage>> {
        let downloads = document.pages.iter().map(|page| async move {
            let image = self.download(&page.image_url).await?;
            Ok::<_, AppError>(IllustratedPage {
                text: page.text.clone(),
                image,
            })
        });
        try_join_all(downloads).await
    }

    async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        debug!("下载插图: {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::request_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::service(url, Some(status.as_u16()), "插图下载失败"));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::request_failed(url, e))?;
        Ok(bytes.to_vec())
    }

    /// 下载插图并生成 PDF（不会重新调用故事或图片生成服务）
    pub async fn build_pdf(&self, document: &GeneratedDocument) -> AppResult<Vec<u8>> {
        let pages = self.fetch_images(document).await?;
        self.assemble(&pages)
    }

    /// 排版并渲染 PDF
    pub fn assemble(&self, pages: &[IllustratedPage]) -> AppResult<Vec<u8>> {
        if pages.is_empty() {
            return Err(AppError::Document("没有可排版的内容".to_string()));
        }

        let images = pages
            .iter()
            .map(|page| -> AppResult<DynamicImage> {
                let decoded = image::load_from_memory(&page.image)?;
                // printpdf 不处理透明通道
                Ok(DynamicImage::ImageRgb8(decoded.to_rgb8()))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let items: Vec<LayoutItem<'_>> = pages
            .iter()
            .zip(&images)
            .map(|(page, image)| LayoutItem {
                text: &page.text,
                image_size: (image.width(), image.height()),
            })
            .collect();

        let plan = plan_layout(&items, &self.settings);
        let bytes = self.render(&plan, &images)?;

        info!("📄 PDF 生成完成: {} 页, {} 字节", plan.page_count(), bytes.len());
        Ok(bytes)
    }

    fn render(&self, plan: &LayoutPlan, images: &[DynamicImage]) -> AppResult<Vec<u8>> {
        let s = &self.settings;
        let (doc, first_page, first_layer) =
            PdfDocument::new(&self.title, Mm(s.page_width_mm), Mm(s.page_height_mm), "Layer 1");
        let font = doc.add_builtin_font(BuiltinFont::Helvetica)?;

        let mut layers: Vec<PdfLayerReference> = vec![doc.get_page(first_page).get_layer(first_layer)];
        for _ in 1..plan.pages.len() {
            let (page, layer) = doc.add_page(Mm(s.page_width_mm), Mm(s.page_height_mm), "Layer 1");
            layers.push(doc.get_page(page).get_layer(layer));
        }

        for (planned, layer) in plan.pages.iter().zip(layers) {
            if let Some(placed) = &planned.image {
                let Some(source) = images.get(placed.source) else {
                    continue;
                };
                // 通过 dpi 把像素宽度换算成目标毫米宽度
                let dpi = source.width() as f32 * 25.4 / placed.width;
                Image::from_dynamic_image(source).add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(Mm(placed.x)),
                        translate_y: Some(Mm(s.page_height_mm - placed.top - placed.height)),
                        dpi: Some(dpi),
                        ..Default::default()
                    },
                );
            }

            for line in &planned.lines {
                layer.use_text(
                    line.text.as_str(),
                    s.font_size_pt,
                    Mm(line.x),
                    Mm(s.page_height_mm - line.baseline),
                    &font,
                );
            }
        }

        Ok(doc.save_to_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoryPage;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 0, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn numbered_lines(count: usize) -> String {
        (1..=count)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_pdf_safe_text_replaces_typographic_marks() {
        assert_eq!(
            pdf_safe_text("\u{201C}Don\u{2019}t\u{201D} \u{2014} she whispered\u{2026}"),
            "\"Don't\" -- she whispered..."
        );
        assert_eq!(pdf_safe_text("café 鬼"), "café ?");
    }

    #[test]
    fn test_plan_layout_uses_safe_text() {
        let items = [LayoutItem {
            text: "It\u{2019}s here\u{2026}",
            image_size: (0, 0),
        }];
        let plan = plan_layout(&items, &LayoutSettings::default());
        assert_eq!(plan.pages[0].lines[0].text, "It's here...");
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_wrap_text_keeps_paragraphs_and_splits_long_words() {
        let lines = wrap_text("ab\n\nabcdefghij", 4);
        assert_eq!(lines, vec!["ab", "", "abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_two_short_segments_make_two_pages() {
        let items = [
            LayoutItem { text: "The fog came.", image_size: (1024, 1024) },
            LayoutItem { text: "It stayed.", image_size: (1024, 1024) },
        ];
        let plan = plan_layout(&items, &LayoutSettings::default());

        assert_eq!(plan.page_count(), 2);
        for (i, page) in plan.pages.iter().enumerate() {
            let image = page.image.as_ref().unwrap();
            assert_eq!(image.source, i);
            assert!((image.width - 190.0).abs() < 0.01);
            assert!((image.height - 190.0).abs() < 0.01);
            assert_eq!(page.lines.len(), 1);
            assert!(page.lines[0].baseline > image.top + image.height);
        }
    }

    #[test]
    fn test_long_segment_adds_pages() {
        let settings = LayoutSettings::default();
        // 方图下方可放 15 行，之后每页 54 行
        let items = [
            LayoutItem { text: &numbered_lines(40), image_size: (512, 512) },
            LayoutItem { text: "short", image_size: (512, 512) },
        ];
        assert_eq!(plan_layout(&items, &settings).page_count(), 3);

        let items = [
            LayoutItem { text: &numbered_lines(100), image_size: (512, 512) },
            LayoutItem { text: "short", image_size: (512, 512) },
        ];
        let plan = plan_layout(&items, &settings);
        assert_eq!(plan.page_count(), 4);
        assert!(plan.pages[1].image.is_none());
        assert!(plan.pages[3].image.is_some());

        for page in &plan.pages {
            for line in &page.lines {
                assert!(line.baseline <= settings.printable_bottom());
            }
        }
    }

    #[test]
    fn test_tall_image_shrinks_to_page() {
        let settings = LayoutSettings::default();
        let items = [LayoutItem { text: "", image_size: (100, 1000) }];
        let plan = plan_layout(&items, &settings);
        let image = plan.pages[0].image.as_ref().unwrap();
        assert!((image.height - 277.0).abs() < 0.01);
        assert!((image.width - 27.7).abs() < 0.01);
    }

    #[test]
    fn test_assemble_produces_pdf() {
        let assembler = DocumentAssembler::new(reqwest::Client::new());
        let pages = vec![
            IllustratedPage { text: "The fog came.".to_string(), image: png_bytes(8, 6) },
            IllustratedPage { text: "It stayed.".to_string(), image: png_bytes(6, 8) },
        ];
        let bytes = assembler.assemble(&pages).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_assemble_rejects_bad_image() {
        let assembler = DocumentAssembler::new(reqwest::Client::new());
        let pages = vec![IllustratedPage { text: "x".to_string(), image: b"not an image".to_vec() }];
        let err = assembler.assemble(&pages).unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
    }

    #[test]
    fn test_assemble_empty_is_error() {
        let assembler = DocumentAssembler::new(reqwest::Client::new());
        assert!(matches!(assembler.assemble(&[]), Err(AppError::Document(_))));
    }

    #[tokio::test]
    async fn test_build_pdf_downloads_images() {
        let mut server = mockito::Server::new_async().await;
        let img = server
            .mock("GET", "/img.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(png_bytes(4, 4))
            .expect(2)
            .create_async()
            .await;

        let url = format!("{}/img.png", server.url());
        let document = GeneratedDocument {
            prompt: "p".to_string(),
            style: "s".to_string(),
            pages: vec![
                StoryPage { text: "one".to_string(), image_url: url.clone() },
                StoryPage { text: "two".to_string(), image_url: url },
            ],
        };

        let bytes = DocumentAssembler::new(reqwest::Client::new())
            .build_pdf(&document)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        img.assert_async().await;
    }

    #[tokio::test]
    async fn test_build_pdf_download_failure() {
        let mut server = mockito::Server::new_async().await;
        let _img = server.mock("GET", "/gone.png").with_status(404).create_async().await;

        let document = GeneratedDocument {
            prompt: "p".to_string(),
            style: "s".to_string(),
            pages: vec![StoryPage {
                text: "one".to_string(),
                image_url: format!("{}/gone.png", server.url()),
            }],
        };

        let err = DocumentAssembler::new(reqwest::Client::new())
            .build_pdf(&document)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Service { status: Some(404), .. }));
    }
}
