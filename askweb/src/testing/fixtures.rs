//! HTML captured from search and answer pages, trimmed to what parsing needs.

/// A result page in the primary markup: two usable results, one internal
/// search link and one blocked domain.
pub const GOOGLE_RESULTS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="vi">
<head><title>Ai chế tạo ra bom nguyên tử - Google Search</title></head>
<body>
<div id="main">
  <div class="g">
    <a href="/url?q=https://vi.wikipedia.org/wiki/Bom_nguy%C3%AAn_t%E1%BB%AD&amp;sa=U&amp;ved=2ahUKEwj"><h3>Bom nguyên tử – Wikipedia tiếng Việt</h3></a>
    <div style="-webkit-line-clamp:2">12 thg 7, 2023 — Bom nguyên tử là loại vũ khí hạt nhân · nhà vật lý Robert Oppenheimer</div>
  </div>
  <div class="g">
    <div><a href="https://hoc247.net/hoi-dap/cha-de-bom-nguyen-tu"><h3>Ai là cha đẻ của bom nguyên tử?</h3></a></div>
    <div style="-webkit-line-clamp:2">Robert Oppenheimer được coi là cha đẻ của bom nguyên tử</div>
  </div>
  <div class="g">
    <a href="/search?num=10&amp;q=bom+nguy%C3%AAn+t%E1%BB%AD&amp;tbm=isch">Hình ảnh về bom nguyên tử</a>
  </div>
  <div class="g">
    <a href="/url?q=https://vi.wiktionary.org/wiki/bom&amp;sa=U"><h3>bom – Wiktionary tiếng Việt</h3></a>
    <div style="-webkit-line-clamp:2">bom nguyên tử</div>
  </div>
</div>
</body>
</html>"#;

/// A result page in the lightweight markup served to old user agents.
pub const GOOGLE_RESULTS_PAGE_LITE: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="ezO2md">
  <div class="AS66f">
    <a href="/url?q=https://loigiaihay.com/bom-nguyen-tu&amp;sa=U"><span>Bom nguyên tử - Lời giải hay</span></a>
    <span class="fYyStc">Bom nguyên tử được chế tạo lần đầu năm 1945.</span>
  </div>
</div>
</body>
</html>"#;

/// A question-and-answer page with site chrome around the answer box.
pub const ARTICLE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="vi">
<head><title>Ai là cha đẻ của bom nguyên tử?</title><script>var x = 1;</script></head>
<body>
<header><a href="/">hoc247.net</a> <a href="/hoi-dap">Hỏi đáp</a></header>
<div class="content_box">
  <h1>Ai là cha đẻ của bom nguyên tử?</h1>
  <p>Robert Oppenheimer được coi là cha đẻ của bom nguyên tử, ông là nhà vật lý người Mỹ đã chế tạo ra bom nguyên tử đầu tiên.</p>
  <p>Ông lãnh đạo phòng thí nghiệm Los Alamos trong Dự án Manhattan.</p>
  <p>Quả bom nguyên tử đầu tiên được thử nghiệm vào tháng 7 năm 1945.</p>
</div>
<footer>Bản quyền thuộc về hoc247.net</footer>
</body>
</html>"#;

/// An encyclopedia article body.
pub const WIKI_PAGE: &str = r#"<!DOCTYPE html>
<html lang="vi">
<body>
<nav class="menu"><a href="/wiki/Trang_Chinh">Trang Chính</a></nav>
<div id="content">
  <div class="mw-parser-output">
    <p>Bom nguyên tử là loại vũ khí hạt nhân có sức công phá rất lớn.</p>
    <p>Bom nguyên tử là loại vũ khí hạt nhân, nhà vật lý Robert Oppenheimer đứng đầu nhóm chế tạo bom nguyên tử của Mỹ.</p>
  </div>
</div>
</body>
</html>"#;
