use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use walkdir::WalkDir;

use crate::media::MediaItem;
use crate::slideshow::{ACTIVE_SYMBOL, INACTIVE_SYMBOL, SLIDESHOW_PERIOD};
use crate::upload::{FIELD_NAME, MAX_FILE_SIZE, MAX_FILES, UPLOAD_ROUTE};
use crate::viewer::{FADE_DURATION, PLACEHOLDER_SRC};

pub const INDEX_FILE: &str = "index.html";

/// Collect every image and video under the public directory, as paths
/// relative to it, sorted.
pub fn collect_media(dir: &Path) -> Vec<MediaItem> {
    let mut rels: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    rels.sort();

    rels.iter()
        .filter_map(|rel| MediaItem::from_rel_path(rel))
        .collect()
}

/// Build the full gallery page.
pub fn generate_html(items: &[MediaItem]) -> String {
    let mut thumbs_html = String::new();
    for (i, item) in items.iter().enumerate() {
        let name = item.source.rsplit('/').next().unwrap_or(&item.source);
        if item.is_video() {
            thumbs_html.push_str(&format!(
                "  <div class=\"thumb video\" data-idx=\"{i}\" data-kind=\"video\" data-src=\"{src}\" title=\"{name}\">\
                <video muted preload=\"none\" data-src=\"{src}\"></video><span class=\"badge\">&#9654;</span></div>\n",
                src = escape_html(&item.source),
                name = escape_html(name),
            ));
        } else {
            thumbs_html.push_str(&format!(
                "  <div class=\"thumb\" data-idx=\"{i}\" data-kind=\"image\" data-src=\"{src}\" title=\"{name}\">\
                <img src=\"{placeholder}\" data-src=\"{src}\" alt=\"{name}\"></div>\n",
                src = escape_html(&item.source),
                name = escape_html(name),
                placeholder = PLACEHOLDER_SRC,
            ));
        }
    }

    let media_json = format!(
        "[{}]",
        items
            .iter()
            .map(|item| format!(
                "{{\"src\":\"{}\",\"kind\":\"{}\"}}",
                escape_js(&item.source),
                item.kind.as_str()
            ))
            .collect::<Vec<_>>()
            .join(",")
    );

    format!(
        r##"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>media gallery</title>
<style>
*{{margin:0;padding:0;box-sizing:border-box}}
body{{background:#0a0a0a;color:#e0e0e0;font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;overflow-x:hidden}}
header{{position:sticky;top:0;z-index:100;background:rgba(10,10,10,.95);backdrop-filter:blur(12px);padding:1rem 2rem;display:flex;justify-content:space-between;align-items:center;border-bottom:1px solid #222}}
header h1{{font-size:1.2rem;font-weight:600;color:#4fc3f7}}
header .count{{font-size:.9rem;color:#555;margin-left:.5rem}}
.controls{{display:flex;gap:.5rem;align-items:center}}
.controls button{{background:#1a1a1a;color:#ccc;border:1px solid #333;padding:.4rem .8rem;border-radius:6px;cursor:pointer;font-size:1.1rem;transition:all .2s}}
.controls button:hover,.controls button.active{{background:#4fc3f7;color:#000;border-color:#4fc3f7}}
.stage{{display:flex;justify-content:center;align-items:center;height:65vh;background:#000;border-bottom:1px solid #1a1a1a}}
.stage img,.stage video{{max-width:95vw;max-height:63vh;object-fit:contain;transition:opacity {fade_ms}ms ease;user-select:none}}
.stage .faded{{opacity:0}}
.stage .hidden{{display:none}}
main{{padding:1rem 2rem 2rem}}
.grid{{display:grid;grid-template-columns:repeat(auto-fill,minmax(140px,1fr));gap:6px}}
.thumb{{position:relative;aspect-ratio:1;overflow:hidden;border-radius:4px;cursor:pointer;border:2px solid transparent;transition:transform .2s,border-color .2s}}
.thumb:hover{{transform:scale(1.03);z-index:1}}
.thumb.active{{border-color:#4fc3f7}}
.thumb img,.thumb video{{width:100%;height:100%;object-fit:cover;background:#111}}
.thumb .badge{{position:absolute;bottom:.3rem;right:.4rem;font-size:.8rem;color:#fff;text-shadow:0 0 4px #000}}
.empty{{padding:3rem;text-align:center;color:#666}}
.upload{{padding:1rem 2rem 4rem;border-top:1px solid #1a1a1a;display:flex;gap:.8rem;align-items:center;flex-wrap:wrap}}
.upload button{{background:#1a1a1a;color:#ccc;border:1px solid #333;padding:.4rem .8rem;border-radius:6px;cursor:pointer}}
.upload button:hover{{background:#4fc3f7;color:#000;border-color:#4fc3f7}}
.upload progress{{width:240px;height:8px;accent-color:#4fc3f7}}
.upload progress.error{{accent-color:#ef5350;background:#ef5350}}
#upload-status{{font-size:.85rem;color:#999}}
#upload-status.error{{color:#ef5350}}
#upload-status.ok{{color:#66bb6a}}
@media(max-width:600px){{
  .grid{{grid-template-columns:repeat(auto-fill,minmax(90px,1fr));gap:3px}}
  header,main,.upload{{padding-left:1rem;padding-right:1rem}}
}}
</style>
</head>
<body>
<header>
  <h1>media gallery<span class="count">{count}</span></h1>
  <div class="controls">
    <button id="slideshowToggle" title="Diaporama">{inactive}</button>
  </div>
</header>
<div class="stage" id="stage">
  <img id="displayedImage" src="" alt="" class="hidden">
  <video id="displayedVideo" controls class="hidden"></video>
</div>
<main>
{empty}<div class="grid" id="thumbnails">
{thumbs}</div>
</main>
<form class="upload" id="upload-form" action="{upload_route}" method="post" enctype="multipart/form-data">
  <input type="file" id="upload-input" name="{field}" accept="image/*,video/*" multiple>
  <button type="submit">Envoyer</button>
  <progress id="upload-progress" value="0" max="100"></progress>
  <span id="upload-status"></span>
</form>

<script>
const MEDIA={media_json};
const FADE_MS={fade_ms};
const SLIDESHOW_MS={period_ms};
const MAX_FILE_SIZE={max_file_size};
const MAX_FILES={max_files};
const ACTIVE_SYMBOL="{active}";
const INACTIVE_SYMBOL="{inactive}";

const stage=document.getElementById('stage');
const displayedImage=document.getElementById('displayedImage');
const displayedVideo=document.getElementById('displayedVideo');
const toggle=document.getElementById('slideshowToggle');
const thumbs=Array.from(document.querySelectorAll('.thumb'));

let currentIndex=0;
let slideshowTimer=null;
let pendingSwap=null;

// Viewer: swap the displayed source
function showMedia(idx,autoplay){{
  const item=MEDIA[idx];
  if(item.kind==='video'){{
    displayedImage.classList.add('hidden');
    displayedImage.removeAttribute('src');
    displayedVideo.src=item.src;
    displayedVideo.classList.remove('hidden','faded');
    if(autoplay)displayedVideo.play().catch(()=>{{}});
  }}else{{
    displayedVideo.pause();
    displayedVideo.classList.add('hidden');
    displayedVideo.removeAttribute('src');
    displayedImage.src=item.src;
    displayedImage.classList.remove('hidden','faded');
  }}
}}

// Selection: mark the thumbnail, fade out, swap, fade in
function displayMedia(idx){{
  if(idx<0||idx>=MEDIA.length)return;
  thumbs.forEach((t,i)=>t.classList.toggle('active',i===idx));
  const shown=[displayedImage,displayedVideo].find(el=>!el.classList.contains('hidden'));
  if(shown)shown.classList.add('faded');
  clearTimeout(pendingSwap);
  pendingSwap=setTimeout(()=>{{
    pendingSwap=null;
    showMedia(idx,true);
  }},shown?FADE_MS:0);
}}

// Slideshow
function setSlideshow(running){{
  clearInterval(slideshowTimer);
  slideshowTimer=null;
  if(running){{
    slideshowTimer=setInterval(()=>{{
      if(MEDIA.length<=1)return;
      currentIndex=(currentIndex+1)%MEDIA.length;
      displayMedia(currentIndex);
    }},SLIDESHOW_MS);
  }}
  toggle.textContent=running?ACTIVE_SYMBOL:INACTIVE_SYMBOL;
  toggle.classList.toggle('active',running);
}}

toggle.addEventListener('click',()=>setSlideshow(slideshowTimer===null));

thumbs.forEach((el,i)=>{{
  el.addEventListener('click',()=>{{
    setSlideshow(false);
    currentIndex=i;
    displayMedia(i);
  }});
}});

// Fullscreen on double-click
stage.addEventListener('dblclick',()=>{{
  const fs=document.fullscreenElement||document.webkitFullscreenElement;
  if(fs){{
    (document.exitFullscreen||document.webkitExitFullscreen).call(document);
  }}else{{
    const req=stage.requestFullscreen||stage.webkitRequestFullscreen;
    if(req)req.call(stage);
  }}
}});
function onFullscreenChange(){{
  const fs=!!(document.fullscreenElement||document.webkitFullscreenElement);
  stage.classList.toggle('fullscreen',fs);
}}
document.addEventListener('fullscreenchange',onFullscreenChange);
document.addEventListener('webkitfullscreenchange',onFullscreenChange);

// Lazy loading of thumbnails
function reveal(el){{
  const media=el.querySelector('img,video');
  if(media&&media.dataset.src){{
    media.src=media.dataset.src;
    delete media.dataset.src;
  }}
}}
if('IntersectionObserver' in window){{
  const observer=new IntersectionObserver(entries=>{{
    entries.forEach(entry=>{{
      if(entry.isIntersecting){{
        reveal(entry.target);
        observer.unobserve(entry.target);
      }}
    }});
  }});
  thumbs.forEach(el=>observer.observe(el));
}}else{{
  thumbs.forEach(reveal);
}}

// Upload with progress
const form=document.getElementById('upload-form');
const input=document.getElementById('upload-input');
const bar=document.getElementById('upload-progress');
const status=document.getElementById('upload-status');

function setStatus(text,cls){{
  status.textContent=text;
  status.className=cls||'';
}}

function uploadFailed(msg){{
  bar.classList.add('error');
  setStatus(msg,'error');
  alert(msg);
}}

form.addEventListener('submit',e=>{{
  e.preventDefault();
  const files=Array.from(input.files);
  if(files.length===0){{uploadFailed('Veuillez sélectionner des fichiers à envoyer.');return;}}
  if(files.length>MAX_FILES){{uploadFailed(MAX_FILES+' fichiers au maximum par envoi.');return;}}
  const big=files.find(f=>f.size>MAX_FILE_SIZE);
  if(big){{uploadFailed('Le fichier « '+big.name+' » est trop volumineux et ne peut pas être envoyé.');return;}}

  const data=new FormData();
  files.forEach(f=>data.append('{field}',f));
  const xhr=new XMLHttpRequest();
  xhr.open('POST','{upload_route}');
  xhr.upload.addEventListener('progress',ev=>{{
    if(ev.lengthComputable)bar.value=Math.round(ev.loaded/ev.total*100);
  }});
  xhr.addEventListener('load',()=>{{
    if(xhr.status===200){{
      bar.value=100;
      const res=JSON.parse(xhr.responseText);
      setStatus(res.message+' ('+res.files.map(f=>f.originalname).join(', ')+')','ok');
      form.reset();
    }}else{{
      uploadFailed(xhr.responseText||('Erreur '+xhr.status));
    }}
  }});
  xhr.addEventListener('error',()=>uploadFailed('Une erreur est survenue pendant l\'envoi.'));
  bar.classList.remove('error');
  bar.value=0;
  setStatus('Envoi en cours…');
  xhr.send(data);
}});

// First item shown, no thumbnail active yet
if(MEDIA.length>0)showMedia(0,false);
</script>
</body>
</html>"##,
        count = items.len(),
        thumbs = thumbs_html,
        empty = if items.is_empty() {
            "<p class=\"empty\">Aucun média pour l'instant.</p>\n"
        } else {
            ""
        },
        media_json = media_json,
        fade_ms = FADE_DURATION.as_millis(),
        period_ms = SLIDESHOW_PERIOD.as_millis(),
        max_file_size = MAX_FILE_SIZE,
        max_files = MAX_FILES,
        active = ACTIVE_SYMBOL,
        inactive = INACTIVE_SYMBOL,
        upload_route = UPLOAD_ROUTE,
        field = FIELD_NAME,
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace("</", "<\\/")
}

/// Write `index.html` in the public directory unless one already exists.
/// Returns whether a page was written.
pub fn ensure_index(dir: &Path) -> Result<bool> {
    let path = dir.join(INDEX_FILE);
    if path.exists() {
        return Ok(false);
    }
    let html = generate_html(&collect_media(dir));
    std::fs::write(&path, html)
        .with_context(|| format!("Impossible d'écrire {}", path.display()))?;
    Ok(true)
}

pub fn run_gallery(dir: &Path) -> Result<()> {
    let items = collect_media(dir);
    if items.is_empty() {
        anyhow::bail!("Aucun média trouvé dans {}", dir.display());
    }

    let html = generate_html(&items);
    let output_path = dir.join(INDEX_FILE);
    std::fs::write(&output_path, &html)
        .with_context(|| format!("Impossible d'écrire {}", output_path.display()))?;

    let videos = items.iter().filter(|i| i.is_video()).count();
    println!(
        "  {} {} médias ({} images, {} vidéos) dans la galerie {} {}",
        style("✔").green().bold(),
        style(items.len()).cyan().bold(),
        items.len() - videos,
        videos,
        style("→").dim(),
        style(output_path.display()).white()
    );

    Ok(())
}
