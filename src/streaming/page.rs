/// Built-in live view: the annotated stream plus the control endpoints
pub(crate) const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Sortcam</title>
    <style>
        :root { color-scheme: dark; }
        body { margin: 0; background: #111; color: #ddd; font-family: monospace; display: flex; gap: 1em; padding: 1em; }
        img.stream { display: block; max-width: 60vw; background: #000; }
        pre { background: #000; padding: 0.5em; min-height: 10em; white-space: pre-wrap; }
        section { flex: 1; }
    </style>
</head>
<body>
    <img class="stream" src="/stream.mjpg" alt="Sortcam stream">
    <section>
        <p>Collecting: <span id="active">-</span></p>
        <p>Recognized: <span id="recognized">-</span></p>
        <p>Votes: <span id="counts">-</span></p>
        <form id="send">
            <input id="cmd" placeholder="command">
            <button>Send</button>
            <span id="sent"></span>
        </form>
        <pre id="log"></pre>
    </section>
    <script>
        async function getJson(path) {
            const response = await fetch(path);
            return response.json();
        }
        async function refresh() {
            try {
                document.getElementById("active").textContent = (await getJson("/collection/status")).active;
                document.getElementById("recognized").textContent = (await getJson("/classification/result")).recognized;
                document.getElementById("counts").textContent = JSON.stringify((await getJson("/classification/buffer")).counts);
                document.getElementById("log").textContent = (await getJson("/serial/log")).messages.join("\n");
            } catch (e) {}
        }
        document.getElementById("send").addEventListener("submit", async (event) => {
            event.preventDefault();
            const cmd = document.getElementById("cmd").value;
            const response = await fetch("/serial/send?cmd=" + encodeURIComponent(cmd));
            document.getElementById("sent").textContent = await response.text();
        });
        setInterval(refresh, 500);
        refresh();
    </script>
</body>
</html>
"#;

pub(crate) fn missing_page(path: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>Sortcam</title></head><body>\
         <h1>Index page unavailable</h1><p>Could not read {}</p>\
         <p><a href=\"/stream.mjpg\">Live stream</a></p></body></html>\n",
        html_escape(path)
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
