//! Embedded HTML dashboard.
//!
//! Single page that subscribes to `/ws/live` and shows the latest frequency
//! with its age. No build step, pure HTML/CSS/JS.

use axum::response::Html;

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Grid Frequency</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            min-height: 100vh;
        }
        .header {
            background: #16213e;
            padding: 1rem 2rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
            border-bottom: 2px solid #0f3460;
        }
        .header h1 { font-size: 1.5rem; font-weight: 600; }
        .status-badge {
            padding: 0.25rem 0.75rem;
            border-radius: 9999px;
            font-size: 0.875rem;
        }
        .status-live { background: #10b981; color: #fff; }
        .status-stale { background: #f59e0b; color: #000; }
        .status-disconnected { background: #374151; color: #9ca3af; }
        .container { padding: 2rem; text-align: center; }
        .frequency { font-size: 5rem; font-variant-numeric: tabular-nums; }
        .unit { font-size: 2rem; color: #9ca3af; }
        .detail { margin-top: 1rem; color: #9ca3af; }
        canvas { margin-top: 2rem; background: #16213e; border-radius: 0.5rem; }
    </style>
</head>
<body>
    <div class="header">
        <h1>Grid Frequency</h1>
        <span id="status" class="status-badge status-disconnected">DISCONNECTED</span>
    </div>
    <div class="container">
        <div><span id="frequency" class="frequency">--.--</span> <span class="unit">Hz</span></div>
        <div id="updated" class="detail">waiting for first estimate</div>
        <canvas id="trend" width="720" height="200"></canvas>
    </div>
    <script>
        const history = [];
        const maxPoints = 300;
        let ws;

        function setStatus(text, cls) {
            const el = document.getElementById('status');
            el.textContent = text;
            el.className = 'status-badge ' + cls;
        }

        function draw() {
            const canvas = document.getElementById('trend');
            const ctx = canvas.getContext('2d');
            ctx.clearRect(0, 0, canvas.width, canvas.height);
            if (history.length < 2) return;
            const lo = Math.min(...history) - 0.05;
            const hi = Math.max(...history) + 0.05;
            ctx.strokeStyle = '#10b981';
            ctx.beginPath();
            history.forEach((f, i) => {
                const x = i * canvas.width / (maxPoints - 1);
                const y = canvas.height - (f - lo) / (hi - lo) * canvas.height;
                if (i === 0) ctx.moveTo(x, y); else ctx.lineTo(x, y);
            });
            ctx.stroke();
        }

        function onPayload(p) {
            if (p.frequency === null) return;
            document.getElementById('frequency').textContent = p.frequency.toFixed(2);
            const age = p.timestamp - p.last_update_time;
            document.getElementById('updated').textContent =
                'updated ' + new Date(p.last_update_time * 1000).toLocaleTimeString();
            setStatus(age > 5 ? 'STALE' : 'LIVE', age > 5 ? 'status-stale' : 'status-live');
            history.push(p.frequency);
            if (history.length > maxPoints) history.shift();
            draw();
        }

        function connect() {
            const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(proto + '//' + location.host + '/ws/live');
            ws.onmessage = (ev) => onPayload(JSON.parse(ev.data));
            ws.onclose = () => {
                setStatus('DISCONNECTED', 'status-disconnected');
                setTimeout(connect, 2000);
            };
        }

        connect();
    </script>
</body>
</html>
"#;

/// Dashboard handler.
///
/// GET / and GET /dashboard
pub async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}
