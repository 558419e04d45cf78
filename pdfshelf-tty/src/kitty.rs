use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use pdfshelf_core::PageImage;

const CHUNK_SIZE: usize = 4096;

/// Draws PNG pages with the kitty graphics protocol.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Largest cell area with the image's aspect ratio that fits in
    /// `available_cols` x `available_rows`, given the terminal cell size in
    /// pixels. Without a known cell size the image fills the width.
    pub fn fit(
        image: &PageImage,
        available_cols: u32,
        available_rows: u32,
        cell_width: f32,
        cell_height: f32,
    ) -> Self {
        let available_cols = available_cols.max(1);
        let available_rows = available_rows.max(1);
        if image.width == 0 || image.height == 0 {
            return Self::clamped(available_cols, available_rows);
        }

        let (cell_width, cell_height) = if cell_width > 0.0 && cell_height > 0.0 {
            (cell_width, cell_height)
        } else {
            (1.0, 2.0)
        };
        let ratio = (image.width as f32 / cell_width) / (image.height as f32 / cell_height);
        if !ratio.is_finite() || ratio <= 0.0 {
            return Self::clamped(available_cols, available_rows);
        }

        let mut cols = available_cols as f32;
        let mut rows = (cols / ratio).round().max(1.0);
        if rows > available_rows as f32 {
            rows = available_rows as f32;
            cols = (rows * ratio).round().max(1.0);
        }

        Self::clamped(
            (cols as u32).min(available_cols),
            (rows as u32).min(available_rows),
        )
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Transmits the page (already PNG, `f=100`) and places it at the cursor.
    pub fn draw(&mut self, image: &PageImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(&image.png);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image placement this renderer made.
    pub fn clear_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal shows everything written since `begin_sync_update` at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: u32, height: u32, png_len: usize) -> PageImage {
        PageImage {
            page_index: 0,
            zoom: 1.0,
            width,
            height,
            png: vec![7; png_len],
        }
    }

    #[test]
    fn draw_emits_single_png_transmission() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw(&page(10, 20, 16), DrawParams::clamped(10, 5))
            .unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.starts_with("\u{1b}_Ga=T,f=100,"));
        assert!(output.contains("c=10,r=5,s=10,v=20"));
        assert!(output.contains("m=0;"));
        assert!(output.ends_with("\u{1b}\\"));
    }

    #[test]
    fn draw_chunks_large_payloads() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw(&page(1, 1, CHUNK_SIZE * 2), DrawParams::clamped(1, 1))
            .unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.contains(",m=1;"));
        assert!(output.contains("\u{1b}_Gm=1,q=2;"));
        assert!(output.contains("\u{1b}_Gm=0,q=2;"));
    }

    #[test]
    fn fit_preserves_aspect_ratio_within_bounds() {
        // Portrait page, square cells: height limits.
        let params = DrawParams::fit(&page(100, 200, 1), 80, 40, 10.0, 10.0);
        assert_eq!((params.columns, params.rows), (20, 40));

        // Landscape page: width limits.
        let params = DrawParams::fit(&page(400, 100, 1), 80, 40, 10.0, 10.0);
        assert_eq!((params.columns, params.rows), (80, 20));
    }

    #[test]
    fn fit_falls_back_for_empty_images() {
        let params = DrawParams::fit(&page(0, 0, 0), 0, 0, 0.0, 0.0);
        assert_eq!((params.columns, params.rows), (1, 1));
    }
}
